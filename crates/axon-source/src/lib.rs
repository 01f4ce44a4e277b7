#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Result;
use axon_domain::SchemaRow;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("schema source not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("schema source '{0}' is not connected")]
    NotConnected(String),
    #[error("malformed schema row in {}: {message}", .path.display())]
    Malformed { path: PathBuf, message: String },
}

/// Where a pipeline run reads the source schema from.
pub trait SchemaSource {
    fn source_name(&self) -> String;

    #[allow(clippy::missing_errors_doc)]
    fn connect(&mut self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn disconnect(&mut self) -> Result<()>;

    #[allow(clippy::missing_errors_doc)]
    fn get_schema(&mut self) -> Result<Vec<SchemaRow>>;
}

/// In-memory rows, for development runs and tests.
#[derive(Debug, Clone, Default)]
pub struct FixtureSource {
    rows: Vec<SchemaRow>,
    connected: bool,
    disconnect_count: usize,
}

impl FixtureSource {
    #[must_use]
    pub fn new(rows: Vec<SchemaRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// A small users/orders schema.
    #[must_use]
    pub fn sample() -> Self {
        Self::new(vec![
            SchemaRow::new("users", "user_id", "INTEGER"),
            SchemaRow::new("users", "email", "VARCHAR(255)"),
            SchemaRow::new("orders", "order_id", "INTEGER"),
            SchemaRow::new("orders", "user_id", "INTEGER"),
            SchemaRow::new("orders", "order_date", "TIMESTAMP"),
        ])
    }

    #[must_use]
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_count
    }
}

impl SchemaSource for FixtureSource {
    fn source_name(&self) -> String {
        "fixture".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        tracing::info!("connected to fixture schema source");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        self.disconnect_count += 1;
        tracing::info!("disconnected from fixture schema source");
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Vec<SchemaRow>> {
        if !self.connected {
            return Err(SourceError::NotConnected(self.source_name()).into());
        }
        Ok(self.rows.clone())
    }
}

/// Schema rows read from a CSV file with a `table_name,column_name,data_type`
/// header. Extra columns are ignored.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    connected: bool,
}

impl CsvSource {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        tracing::info!(path = %path.display(), "CSV schema source initialized");
        Self {
            path: path.to_path_buf(),
            connected: false,
        }
    }
}

impl SchemaSource for CsvSource {
    fn source_name(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    fn connect(&mut self) -> Result<()> {
        if !self.path.is_file() {
            tracing::error!(path = %self.path.display(), "CSV schema file not found");
            return Err(SourceError::NotFound(self.path.clone()).into());
        }
        self.connected = true;
        tracing::info!(path = %self.path.display(), "CSV schema source is accessible");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        tracing::info!("disconnected from CSV schema source");
        Ok(())
    }

    fn get_schema(&mut self) -> Result<Vec<SchemaRow>> {
        if !self.connected {
            return Err(SourceError::NotConnected(self.source_name()).into());
        }

        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|err| SourceError::Malformed {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        let mut rows = Vec::new();
        for record in reader.deserialize::<SchemaRow>() {
            let row = record.map_err(|err| SourceError::Malformed {
                path: self.path.clone(),
                message: err.to_string(),
            })?;
            rows.push(row);
        }

        tracing::info!(rows = rows.len(), path = %self.path.display(), "loaded schema from CSV");
        Ok(rows)
    }
}

#![forbid(unsafe_code)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use axon_domain::RunRecord;

/// Context string injected when no earlier run has been recorded.
pub const NO_CONTEXT_SENTINEL: &str = "No previous runs available for context.";

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("run memory io error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("run memory at {} is not a JSON array of run records: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode run memory: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Append-only history of completed runs.
///
/// Implementations swallow read failures: `load` degrades to an empty history
/// instead of failing the caller.
pub trait RunHistoryStore {
    fn load(&self) -> Vec<RunRecord>;

    /// Append one record and return the new history length.
    ///
    /// # Errors
    /// Returns an error when the history cannot be written back.
    fn append(&self, record: &RunRecord) -> Result<usize, MemoryError>;

    fn latest_context(&self) -> String {
        render_latest_context(&self.load())
    }

    fn full_context(&self) -> String {
        render_full_context(&self.load())
    }
}

#[must_use]
pub fn render_latest_context(records: &[RunRecord]) -> String {
    let Some(latest) = records.last() else {
        return NO_CONTEXT_SENTINEL.to_string();
    };
    match serde_json::to_string_pretty(latest) {
        Ok(rendered) => rendered,
        Err(err) => {
            tracing::warn!("failed to render latest run record: {err}");
            NO_CONTEXT_SENTINEL.to_string()
        }
    }
}

#[must_use]
pub fn render_full_context(records: &[RunRecord]) -> String {
    if records.is_empty() {
        return NO_CONTEXT_SENTINEL.to_string();
    }
    match serde_json::to_string_pretty(records) {
        Ok(rendered) => rendered,
        Err(err) => {
            tracing::warn!("failed to render run history: {err}");
            NO_CONTEXT_SENTINEL.to_string()
        }
    }
}

/// Run history kept as one JSON array on disk, rewritten in full on every
/// append. The mutex serialises appends within this process only; two
/// processes sharing the file can still lose updates.
#[derive(Debug)]
pub struct JsonFileRunMemory {
    path: PathBuf,
    guard: Mutex<()>,
}

impl JsonFileRunMemory {
    /// Open the history at `path`, creating an empty one if none exists.
    /// Existing history is never overwritten.
    ///
    /// # Errors
    /// Returns an error when the parent directory or the initial file cannot be created.
    pub fn open(path: &Path) -> Result<Self, MemoryError> {
        let memory = Self {
            path: path.to_path_buf(),
            guard: Mutex::new(()),
        };
        memory.ensure_initialized()?;
        Ok(memory)
    }

    fn ensure_initialized(&self) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| MemoryError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        if !self.path.exists() {
            self.write_all(&[])?;
            tracing::info!(path = %self.path.display(), "created new run memory file");
        }
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<RunRecord>, MemoryError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                self.ensure_initialized()?;
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(MemoryError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content).map_err(|source| MemoryError::Decode {
            path: self.path.clone(),
            source,
        })
    }

    fn write_all(&self, records: &[RunRecord]) -> Result<(), MemoryError> {
        let encoded = serde_json::to_string_pretty(records)?;
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        fs::write(&staging, encoded).map_err(|source| MemoryError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| MemoryError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn load_or_empty(&self) -> Vec<RunRecord> {
        match self.read_all() {
            Ok(records) => records,
            Err(err) => {
                tracing::error!("failed to load run memory, continuing without history: {err}");
                Vec::new()
            }
        }
    }
}

impl RunHistoryStore for JsonFileRunMemory {
    fn load(&self) -> Vec<RunRecord> {
        let _held = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let records = self.load_or_empty();
        tracing::debug!(records = records.len(), "loaded run memory");
        records
    }

    fn append(&self, record: &RunRecord) -> Result<usize, MemoryError> {
        let _held = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        let mut records = self.load_or_empty();
        records.push(record.clone());
        self.write_all(&records)?;
        tracing::info!(total = records.len(), "saved run to memory");
        Ok(records.len())
    }
}

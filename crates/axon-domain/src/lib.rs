#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use ulid::Ulid;

pub type DateTimeUtc = OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RunId(pub Ulid);

impl RunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One column of a source schema, in the order the source reported it.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SchemaRow {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

impl SchemaRow {
    #[must_use]
    pub fn new(table_name: &str, column_name: &str, data_type: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            column_name: column_name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum TableRole {
    #[serde(alias = "fact")]
    Fact,
    #[serde(alias = "dimension")]
    Dimension,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
pub enum RelationshipType {
    #[serde(alias = "One-to-Many", alias = "one_to_many", alias = "one-to-many")]
    OneToMany,
    #[serde(alias = "Many-to-One", alias = "many_to_one", alias = "many-to-one")]
    ManyToOne,
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct KeyTable {
    #[serde(default, deserialize_with = "lenient")]
    pub table_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub role: TableRole,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Relationship {
    #[serde(default, deserialize_with = "lenient")]
    pub from_table: String,
    #[serde(default, deserialize_with = "lenient")]
    pub from_column: String,
    #[serde(default, deserialize_with = "lenient")]
    pub to_table: String,
    #[serde(default, deserialize_with = "lenient")]
    pub to_column: String,
    #[serde(default, deserialize_with = "lenient")]
    pub relationship_type: RelationshipType,
}

/// Structured schema analysis as decoded from model output.
///
/// Decoding is permissive: missing, null or mistyped fields fall back to
/// their defaults, list entries that are not objects are dropped, and
/// unknown top-level keys are kept in `extra`. Consumers must not assume any
/// section is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaAnalysis {
    #[serde(default, deserialize_with = "lenient")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub key_tables: Vec<KeyTable>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub relationships: Vec<Relationship>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decode a field, using its default when the value is null or of the wrong shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Decode a list entry by entry, dropping entries that do not decode. Anything
/// other than an array yields an empty list.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

impl SchemaAnalysis {
    /// An `error` key the model put into an otherwise decodable object.
    ///
    /// Only a truthy value counts: `null`, `false`, `0`, `""`, `[]` and `{}`
    /// are treated as no error.
    #[must_use]
    pub fn error_marker(&self) -> Option<&str> {
        match self.extra.get("error")? {
            Value::String(message) if !message.is_empty() => Some(message.as_str()),
            Value::Bool(true) => Some("analysis reported an error"),
            Value::Number(number) if number.as_f64().is_some_and(|n| n.abs() > 0.0) => {
                Some("analysis reported a numeric error code")
            }
            Value::Array(items) if !items.is_empty() => Some("analysis reported a list of errors"),
            Value::Object(fields) if !fields.is_empty() => {
                Some("analysis reported a structured error")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct AnalysisError {
    pub error: String,
    pub raw_response: String,
}

/// Outcome of parsing the analysis stage's model output. The two variants are
/// mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisReport {
    Error(AnalysisError),
    Analysis(SchemaAnalysis),
}

impl AnalysisReport {
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(err) => Some(err.error.as_str()),
            Self::Analysis(analysis) => analysis.error_marker(),
        }
    }

    #[must_use]
    pub fn analysis(&self) -> Option<&SchemaAnalysis> {
        match self {
            Self::Analysis(analysis) => Some(analysis),
            Self::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyze,
    Plan,
    Transform,
    Validate,
    Optimize,
}

impl Stage {
    /// Stages that write an artifact, in pipeline order.
    pub const ARTIFACT_STAGES: [Stage; 4] =
        [Stage::Plan, Stage::Transform, Stage::Validate, Stage::Optimize];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Plan => "plan",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Optimize => "optimize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator states. `Aborted` is reachable from `Analyzing` only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    LoadingContext,
    Analyzing,
    Planning,
    Transforming,
    Validating,
    Optimizing,
    Persisting,
    Done,
    Aborted,
}

impl PipelineState {
    #[must_use]
    pub fn successor(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::LoadingContext),
            Self::LoadingContext => Some(Self::Analyzing),
            Self::Analyzing => Some(Self::Planning),
            Self::Planning => Some(Self::Transforming),
            Self::Transforming => Some(Self::Validating),
            Self::Validating => Some(Self::Optimizing),
            Self::Optimizing => Some(Self::Persisting),
            Self::Persisting => Some(Self::Done),
            Self::Done | Self::Aborted => None,
        }
    }

    #[must_use]
    pub fn can_abort(self) -> bool {
        matches!(self, Self::Analyzing)
    }

    #[must_use]
    pub fn stage(self) -> Option<Stage> {
        match self {
            Self::Analyzing => Some(Stage::Analyze),
            Self::Planning => Some(Stage::Plan),
            Self::Transforming => Some(Stage::Transform),
            Self::Validating => Some(Stage::Validate),
            Self::Optimizing => Some(Stage::Optimize),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingContext => "loading_context",
            Self::Analyzing => "analyzing",
            Self::Planning => "planning",
            Self::Transforming => "transforming",
            Self::Validating => "validating",
            Self::Optimizing => "optimizing",
            Self::Persisting => "persisting",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

/// Summary of one completed pipeline run, as kept by run memory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub run_id: RunId,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: DateTimeUtc,
    pub source_analysis: SchemaAnalysis,
    pub artifact_paths: BTreeMap<Stage, PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageStatus {
    Generated,
    /// Generation failed and a failure banner was written in place of content.
    Degraded { error: String },
    /// Neither content nor banner could be written.
    WriteFailed { error: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub output_path: PathBuf,
    #[serde(flatten)]
    pub status: StageStatus,
    pub content: String,
}

impl StageOutcome {
    #[must_use]
    pub fn generated_text(&self) -> Option<&str> {
        match self.status {
            StageStatus::Generated => Some(self.content.as_str()),
            StageStatus::Degraded { .. } | StageStatus::WriteFailed { .. } => None,
        }
    }
}

/// Pipeline-fatal conditions of the analysis stage.
#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum StageFailure {
    #[error("schema source yielded no rows")]
    SourceEmpty,
    #[error("schema source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("model generation failed: {0}")]
    Generation(String),
    #[error("{}", .0.error)]
    Parse(AnalysisError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Entered,
    Succeeded,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct PipelineEvent {
    pub run_id: RunId,
    pub state: PipelineState,
    pub stage: Option<Stage>,
    pub status: EventStatus,
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub occurred_at: DateTimeUtc,
}

#[must_use]
pub fn now_utc() -> DateTimeUtc {
    OffsetDateTime::now_utc()
}

/// Ensure a string field is non-empty after trimming.
///
/// # Errors
/// Returns a message naming the field when the value is empty/whitespace.
pub fn ensure_non_empty(field_name: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} MUST be non-empty"));
    }
    Ok(())
}

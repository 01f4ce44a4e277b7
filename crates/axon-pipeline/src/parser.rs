use axon_domain::{AnalysisError, AnalysisReport, SchemaAnalysis};
use serde_json::Value;

/// Diagnostic carried by every [`AnalysisError`] the parser produces.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse JSON from model response.";

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Pick the text that should hold the JSON object.
///
/// The body of the first ```` ```json ```` fence wins and anything after its
/// closing fence is dropped. Without a fence the whole (trimmed) input is the
/// candidate. An opening fence with no closing fence yields `None`.
#[must_use]
pub fn extract_json_candidate(raw: &str) -> Option<&str> {
    let Some(open_at) = raw.find(FENCE_OPEN) else {
        return Some(raw.trim());
    };
    let body = &raw[open_at + FENCE_OPEN.len()..];
    body.find(FENCE_CLOSE).map(|close_at| body[..close_at].trim())
}

/// Decode model output into a schema analysis. Never fails: anything that is
/// not a JSON object becomes an [`AnalysisError`] holding the original text.
/// Field contents are not validated; see [`SchemaAnalysis`].
#[must_use]
pub fn parse_analysis(raw: &str) -> AnalysisReport {
    let decoded = extract_json_candidate(raw)
        .filter(|candidate| !candidate.is_empty())
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .filter(Value::is_object)
        .and_then(|value| serde_json::from_value::<SchemaAnalysis>(value).ok());

    match decoded {
        Some(analysis) => AnalysisReport::Analysis(analysis),
        None => {
            tracing::warn!("model response did not contain a decodable analysis object");
            AnalysisReport::Error(AnalysisError {
                error: PARSE_FAILURE_MESSAGE.to_string(),
                raw_response: raw.to_string(),
            })
        }
    }
}

/// Render an analysis the way a well-behaved model would return it: a single
/// fenced JSON block.
///
/// # Errors
/// Returns an error if the analysis cannot be serialized.
pub fn render_analysis_block(analysis: &SchemaAnalysis) -> serde_json::Result<String> {
    Ok(format!(
        "{FENCE_OPEN}\n{}\n{FENCE_CLOSE}",
        serde_json::to_string_pretty(analysis)?
    ))
}

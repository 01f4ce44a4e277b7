#![forbid(unsafe_code)]

//! Stage agents, response parsing and the orchestrator that sequences a
//! schema migration run.

pub mod agents;
pub mod config;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod writer;

pub use agents::{failure_banner, AnalyzeAgent, ArtifactAgent, StageInput};
pub use config::{
    load_config_from_path, parse_config_yaml, ArtifactNames, ArtifactPaths, ContextMode,
    PipelineConfig,
};
pub use orchestrator::{
    NoopObserver, Orchestrator, PipelineObserver, PipelineRunSummary, RecordingObserver,
    RunConfig,
};
pub use parser::{extract_json_candidate, parse_analysis, render_analysis_block};
pub use writer::{ArtifactWriter, FsArtifactWriter};

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use axon_domain::{PipelineEvent, StageOutcome, StageStatus};
use axon_memory::{JsonFileRunMemory, RunHistoryStore};
use axon_pipeline::{
    load_config_from_path, ContextMode, FsArtifactWriter, NoopObserver, Orchestrator,
    PipelineConfig, PipelineObserver, PipelineRunSummary, RunConfig,
};
use axon_provider::{MockGateway, ModelGateway, ScriptedGateway};
use axon_source::{CsvSource, FixtureSource, SchemaSource};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_DIRECTIVES: [&str; 5] = [
    "axon=info",
    "axon_memory=info",
    "axon_pipeline=info",
    "axon_provider=info",
    "axon_source=info",
];

#[derive(Debug, Parser)]
#[command(name = "axon")]
#[command(about = "Generate schema migration artifacts with a text-generation model")]
struct Cli {
    /// Also append log output to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full analyze/plan/transform/validate/optimize pipeline.
    Run(RunArgs),
    /// Print every stored run record as one JSON line.
    History(HistoryArgs),
    /// Print the context string the next run would inject.
    Context(ContextArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    /// Read the schema from a `table_name,column_name,data_type` CSV file.
    #[arg(long)]
    schema_csv: Option<PathBuf>,
    /// Answer prompts from a YAML reply script instead of the mock model.
    #[arg(long)]
    script: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    memory: Option<PathBuf>,
    /// `latest` or `full`.
    #[arg(long)]
    context: Option<String>,
    /// Stream pipeline events to stdout as JSON lines.
    #[arg(long, default_value_t = false)]
    events: bool,
}

#[derive(Debug, Args)]
struct HistoryArgs {
    #[arg(long)]
    memory: PathBuf,
}

#[derive(Debug, Args)]
struct ContextArgs {
    #[arg(long)]
    memory: PathBuf,
    #[arg(long, default_value = "latest")]
    mode: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Run(args) => run_command(&args),
        Commands::History(args) => history_command(&args),
        Commands::Context(args) => context_command(&args),
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        for directive in DEFAULT_LOG_DIRECTIVES {
            filter = filter.add_directive(directive.parse()?);
        }
    }

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Writes each event to stdout as one JSON line.
struct JsonLinesObserver;

impl PipelineObserver for JsonLinesObserver {
    fn on_event(&self, event: &PipelineEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(err) => {
                tracing::warn!("failed to encode pipeline event: {err}");
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}") {
            tracing::warn!("failed to emit pipeline event: {err}");
        }
    }
}

fn parse_context_mode(value: &str) -> Result<ContextMode> {
    ContextMode::parse(value)
        .ok_or_else(|| anyhow!("unsupported context mode `{value}` (expected latest|full)"))
}

fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_from_path(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(output_dir) = &args.output_dir {
        config.output_dir.clone_from(output_dir);
    }
    if let Some(memory) = &args.memory {
        config.memory_path = Some(memory.clone());
    }
    if let Some(mode) = args.context.as_deref() {
        config.context_mode = parse_context_mode(mode)?;
    }
    config.validate()?;
    Ok(config)
}

fn run_command(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let memory = JsonFileRunMemory::open(&config.memory_path())?;

    let gateway: Box<dyn ModelGateway> = match &args.script {
        Some(path) => Box::new(ScriptedGateway::from_path(config.gateway.clone(), path)?),
        None => Box::new(MockGateway::new(config.gateway.clone())),
    };
    let mut source: Box<dyn SchemaSource> = match &args.schema_csv {
        Some(path) => Box::new(CsvSource::new(path)),
        None => Box::new(FixtureSource::sample()),
    };
    let observer: Box<dyn PipelineObserver> = if args.events {
        Box::new(JsonLinesObserver)
    } else {
        Box::new(NoopObserver)
    };

    let run_config = RunConfig {
        run_id: None,
        context_mode: config.context_mode,
        artifacts: config.artifact_paths(),
    };
    let summary = Orchestrator::new(&memory, gateway.as_ref(), &FsArtifactWriter, observer.as_ref())
        .execute(source.as_mut(), &run_config);

    println!("{}", serde_json::to_string(&summary_json(&summary))?);

    match summary.abort_reason {
        Some(reason) => Err(anyhow!("pipeline aborted: {reason}")),
        None => Ok(()),
    }
}

fn summary_json(summary: &PipelineRunSummary) -> serde_json::Value {
    json!({
        "run_id": summary.run_id.to_string(),
        "final_state": summary.final_state.as_str(),
        "states": summary.states.iter().map(|state| state.as_str()).collect::<Vec<_>>(),
        "abort_reason": summary.abort_reason.as_ref().map(ToString::to_string),
        "persisted": summary.persisted,
        "artifacts": summary.outcomes.iter().map(outcome_json).collect::<Vec<_>>(),
    })
}

fn outcome_json(outcome: &StageOutcome) -> serde_json::Value {
    let (status, error) = match &outcome.status {
        StageStatus::Generated => ("generated", None),
        StageStatus::Degraded { error } => ("degraded", Some(error.as_str())),
        StageStatus::WriteFailed { error } => ("write_failed", Some(error.as_str())),
    };
    json!({
        "stage": outcome.stage.as_str(),
        "path": outcome.output_path.display().to_string(),
        "status": status,
        "error": error,
    })
}

fn history_command(args: &HistoryArgs) -> Result<()> {
    let memory = JsonFileRunMemory::open(&args.memory)?;
    for record in memory.load() {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn context_command(args: &ContextArgs) -> Result<()> {
    let memory = JsonFileRunMemory::open(&args.memory)?;
    let context = match parse_context_mode(&args.mode)? {
        ContextMode::Latest => memory.latest_context(),
        ContextMode::Full => memory.full_context(),
    };
    println!("{context}");
    Ok(())
}

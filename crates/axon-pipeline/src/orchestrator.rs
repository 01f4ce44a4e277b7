use std::cell::RefCell;
use std::collections::BTreeMap;

use axon_domain::{
    now_utc, AnalysisError, AnalysisReport, EventStatus, PipelineEvent, PipelineState, RunId,
    RunRecord, SchemaAnalysis, Stage, StageFailure, StageOutcome, StageStatus,
};
use axon_memory::RunHistoryStore;
use axon_provider::ModelGateway;
use axon_source::SchemaSource;

use crate::agents::{AnalyzeAgent, ArtifactAgent, StageInput};
use crate::config::{ArtifactPaths, ContextMode};
use crate::writer::ArtifactWriter;

/// Receives one event per state transition and per stage result.
pub trait PipelineObserver {
    fn on_event(&self, event: &PipelineEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_event(&self, _event: &PipelineEvent) {}
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: RefCell<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.borrow().clone()
    }

    /// States in the order they were entered.
    #[must_use]
    pub fn states(&self) -> Vec<PipelineState> {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.status == EventStatus::Entered)
            .map(|event| event.state)
            .collect()
    }
}

impl PipelineObserver for RecordingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub run_id: Option<RunId>,
    pub context_mode: ContextMode,
    pub artifacts: ArtifactPaths,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRunSummary {
    pub run_id: RunId,
    pub final_state: PipelineState,
    pub states: Vec<PipelineState>,
    pub abort_reason: Option<StageFailure>,
    pub analysis: Option<SchemaAnalysis>,
    pub outcomes: Vec<StageOutcome>,
    /// False when the run record could not be appended to run memory.
    pub persisted: bool,
}

impl PipelineRunSummary {
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.final_state == PipelineState::Aborted
    }

    /// Stages whose artifact holds a failure banner, or nothing at all.
    #[must_use]
    pub fn degraded_stages(&self) -> Vec<Stage> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status != StageStatus::Generated)
            .map(|outcome| outcome.stage)
            .collect()
    }
}

/// Tracks the current state and publishes transitions.
struct Transitions<'o> {
    run_id: RunId,
    current: PipelineState,
    visited: Vec<PipelineState>,
    observer: &'o dyn PipelineObserver,
}

impl<'o> Transitions<'o> {
    fn start(run_id: RunId, observer: &'o dyn PipelineObserver) -> Self {
        let transitions = Self {
            run_id,
            current: PipelineState::Idle,
            visited: vec![PipelineState::Idle],
            observer,
        };
        transitions.publish(EventStatus::Entered, "run started".to_string());
        transitions
    }

    fn advance(&mut self) {
        match self.current.successor() {
            Some(next) => self.enter(next),
            None => tracing::error!(state = self.current.as_str(), "no successor state"),
        }
    }

    fn abort(&mut self, reason: &StageFailure) {
        if !self.current.can_abort() {
            tracing::error!(state = self.current.as_str(), "abort requested outside the analysis stage");
        }
        self.publish(EventStatus::Failed, reason.to_string());
        self.enter(PipelineState::Aborted);
    }

    fn enter(&mut self, state: PipelineState) {
        tracing::debug!(run_id = %self.run_id, state = state.as_str(), "state transition");
        self.current = state;
        self.visited.push(state);
        self.publish(EventStatus::Entered, format!("entered {}", state.as_str()));
    }

    fn publish(&self, status: EventStatus, message: String) {
        self.observer.on_event(&PipelineEvent {
            run_id: self.run_id,
            state: self.current,
            stage: self.current.stage(),
            status,
            message,
            occurred_at: now_utc(),
        });
    }
}

pub struct Orchestrator<'a> {
    memory: &'a dyn RunHistoryStore,
    gateway: &'a dyn ModelGateway,
    writer: &'a dyn ArtifactWriter,
    observer: &'a dyn PipelineObserver,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        memory: &'a dyn RunHistoryStore,
        gateway: &'a dyn ModelGateway,
        writer: &'a dyn ArtifactWriter,
        observer: &'a dyn PipelineObserver,
    ) -> Self {
        Self {
            memory,
            gateway,
            writer,
            observer,
        }
    }

    /// Drive one pipeline run from `Idle` to `Done` or `Aborted`.
    ///
    /// Only the analysis stage can abort the run. Artifact stages and the
    /// final memory append degrade instead, and the summary records how.
    #[allow(clippy::too_many_lines)]
    pub fn execute(&self, source: &mut dyn SchemaSource, config: &RunConfig) -> PipelineRunSummary {
        let run_id = config.run_id.unwrap_or_default();
        tracing::info!(%run_id, model = self.gateway.model_name(), "pipeline run started");
        let mut transitions = Transitions::start(run_id, self.observer);

        transitions.advance();
        let context = match config.context_mode {
            ContextMode::Latest => self.memory.latest_context(),
            ContextMode::Full => self.memory.full_context(),
        };
        transitions.publish(
            EventStatus::Succeeded,
            format!("loaded {} bytes of context", context.len()),
        );

        transitions.advance();
        let analysis = match self.analyze(source, &context) {
            Ok(analysis) => analysis,
            Err(reason) => {
                tracing::error!(%run_id, "pipeline aborted: {reason}");
                transitions.abort(&reason);
                return PipelineRunSummary {
                    run_id,
                    final_state: transitions.current,
                    states: transitions.visited,
                    abort_reason: Some(reason),
                    analysis: None,
                    outcomes: Vec::new(),
                    persisted: false,
                };
            }
        };
        transitions.publish(
            EventStatus::Succeeded,
            format!(
                "analysis found {} key tables and {} relationships",
                analysis.key_tables.len(),
                analysis.relationships.len()
            ),
        );

        let mut outcomes: Vec<StageOutcome> = Vec::with_capacity(Stage::ARTIFACT_STAGES.len());
        for stage in Stage::ARTIFACT_STAGES {
            transitions.advance();
            let (Some(agent), Some(output_path)) = (
                ArtifactAgent::for_stage(stage, self.gateway, self.writer),
                config.artifacts.path_for(stage),
            ) else {
                continue;
            };
            let generated_sql = match stage {
                Stage::Validate | Stage::Optimize => outcomes
                    .iter()
                    .find(|outcome| outcome.stage == Stage::Transform)
                    .and_then(StageOutcome::generated_text),
                _ => None,
            };
            let outcome = agent.run(&StageInput {
                analysis: &analysis,
                context: &context,
                generated_sql,
                output_path,
            });
            match &outcome.status {
                StageStatus::Generated => transitions.publish(
                    EventStatus::Succeeded,
                    format!("wrote {}", outcome.output_path.display()),
                ),
                StageStatus::Degraded { error } | StageStatus::WriteFailed { error } => {
                    transitions.publish(EventStatus::Degraded, error.clone());
                }
            }
            outcomes.push(outcome);
        }

        transitions.advance();
        let record = RunRecord {
            run_id,
            timestamp: now_utc(),
            source_analysis: analysis.clone(),
            artifact_paths: outcomes
                .iter()
                .map(|outcome| (outcome.stage, outcome.output_path.clone()))
                .collect::<BTreeMap<_, _>>(),
        };
        let persisted = match self.memory.append(&record) {
            Ok(total) => {
                transitions.publish(
                    EventStatus::Succeeded,
                    format!("run memory now holds {total} records"),
                );
                true
            }
            Err(err) => {
                tracing::warn!(%run_id, "run record was not persisted: {err}");
                transitions.publish(EventStatus::Failed, err.to_string());
                false
            }
        };

        transitions.advance();
        tracing::info!(%run_id, "pipeline run complete");
        PipelineRunSummary {
            run_id,
            final_state: transitions.current,
            states: transitions.visited,
            abort_reason: None,
            analysis: Some(analysis),
            outcomes,
            persisted,
        }
    }

    fn analyze(
        &self,
        source: &mut dyn SchemaSource,
        context: &str,
    ) -> Result<SchemaAnalysis, StageFailure> {
        match AnalyzeAgent::new(self.gateway).run(source, context)? {
            AnalysisReport::Error(err) => Err(StageFailure::Parse(err)),
            AnalysisReport::Analysis(analysis) => match analysis.error_marker() {
                None => Ok(analysis),
                Some(marker) => Err(StageFailure::Parse(AnalysisError {
                    error: marker.to_string(),
                    raw_response: serde_json::to_string(&analysis).unwrap_or_default(),
                })),
            },
        }
    }
}

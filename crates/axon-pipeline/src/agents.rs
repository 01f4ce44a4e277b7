use std::path::Path;

use anyhow::{anyhow, Result};
use axon_domain::{
    AnalysisReport, SchemaAnalysis, SchemaRow, Stage, StageFailure, StageOutcome, StageStatus,
};
use axon_provider::ModelGateway;
use axon_source::SchemaSource;

use crate::parser::parse_analysis;
use crate::prompts;
use crate::writer::ArtifactWriter;

/// Fetches the source schema and asks the model for a structured analysis.
/// Writes nothing to disk.
pub struct AnalyzeAgent<'a> {
    gateway: &'a dyn ModelGateway,
}

impl<'a> AnalyzeAgent<'a> {
    #[must_use]
    pub fn new(gateway: &'a dyn ModelGateway) -> Self {
        Self { gateway }
    }

    /// Run the analysis stage. A parse failure is reported inside the returned
    /// [`AnalysisReport`]; the source is always disconnected before returning.
    ///
    /// # Errors
    /// Returns [`StageFailure::SourceEmpty`] when the source has no rows (no
    /// model call is made), [`StageFailure::SourceUnavailable`] when it cannot
    /// be read, and [`StageFailure::Generation`] when the model call fails.
    pub fn run(
        &self,
        source: &mut dyn SchemaSource,
        context: &str,
    ) -> Result<AnalysisReport, StageFailure> {
        tracing::info!(source = %source.source_name(), "starting source analysis");

        let fetched = fetch_rows(source);
        if let Err(err) = source.disconnect() {
            tracing::warn!("schema source disconnect failed: {err:#}");
        }
        let rows = fetched.map_err(|err| StageFailure::SourceUnavailable(format!("{err:#}")))?;

        if rows.is_empty() {
            tracing::warn!("schema is empty, no analysis to perform");
            return Err(StageFailure::SourceEmpty);
        }
        tracing::info!(columns = rows.len(), "schema retrieved");

        let schema_json = serde_json::to_string_pretty(&rows).map_err(|err| {
            StageFailure::SourceUnavailable(format!("failed to render schema rows: {err}"))
        })?;
        let prompt = prompts::analysis_prompt(&schema_json, context);
        let raw = self
            .gateway
            .generate(&prompt)
            .map_err(|err| StageFailure::Generation(format!("{err:#}")))?;

        let report = parse_analysis(&raw);
        if report.analysis().is_some() {
            tracing::info!("schema analysis complete");
        }
        Ok(report)
    }
}

fn fetch_rows(source: &mut dyn SchemaSource) -> Result<Vec<SchemaRow>> {
    source.connect()?;
    source.get_schema()
}

/// Inputs shared by the artifact-writing stages.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'i> {
    pub analysis: &'i SchemaAnalysis,
    pub context: &'i str,
    /// Transform output; read by the validate and optimize stages only.
    pub generated_sql: Option<&'i str>,
    pub output_path: &'i Path,
}

/// One of the plan/transform/validate/optimize stages. Failures never escape
/// `run`: a failure banner is written in place of the artifact instead.
pub struct ArtifactAgent<'a> {
    stage: Stage,
    gateway: &'a dyn ModelGateway,
    writer: &'a dyn ArtifactWriter,
}

impl<'a> ArtifactAgent<'a> {
    #[must_use]
    pub fn plan(gateway: &'a dyn ModelGateway, writer: &'a dyn ArtifactWriter) -> Self {
        Self {
            stage: Stage::Plan,
            gateway,
            writer,
        }
    }

    #[must_use]
    pub fn transform(gateway: &'a dyn ModelGateway, writer: &'a dyn ArtifactWriter) -> Self {
        Self {
            stage: Stage::Transform,
            gateway,
            writer,
        }
    }

    #[must_use]
    pub fn validate(gateway: &'a dyn ModelGateway, writer: &'a dyn ArtifactWriter) -> Self {
        Self {
            stage: Stage::Validate,
            gateway,
            writer,
        }
    }

    #[must_use]
    pub fn optimize(gateway: &'a dyn ModelGateway, writer: &'a dyn ArtifactWriter) -> Self {
        Self {
            stage: Stage::Optimize,
            gateway,
            writer,
        }
    }

    /// Build the agent for an artifact stage; `None` for [`Stage::Analyze`].
    #[must_use]
    pub fn for_stage(
        stage: Stage,
        gateway: &'a dyn ModelGateway,
        writer: &'a dyn ArtifactWriter,
    ) -> Option<Self> {
        match stage {
            Stage::Analyze => None,
            Stage::Plan => Some(Self::plan(gateway, writer)),
            Stage::Transform => Some(Self::transform(gateway, writer)),
            Stage::Validate => Some(Self::validate(gateway, writer)),
            Stage::Optimize => Some(Self::optimize(gateway, writer)),
        }
    }

    #[must_use]
    pub fn run(&self, input: &StageInput<'_>) -> StageOutcome {
        tracing::info!(stage = %self.stage, "starting stage");

        match self.generate_and_write(input) {
            Ok(content) => {
                tracing::info!(stage = %self.stage, path = %input.output_path.display(), "stage artifact generated");
                StageOutcome {
                    stage: self.stage,
                    output_path: input.output_path.to_path_buf(),
                    status: StageStatus::Generated,
                    content,
                }
            }
            Err(err) => {
                let error = format!("{err:#}");
                tracing::error!(stage = %self.stage, "stage failed: {error}");
                let banner = failure_banner(self.stage, &error);
                let status = match self.writer.write(input.output_path, &banner) {
                    Ok(()) => StageStatus::Degraded { error },
                    Err(write_err) => {
                        tracing::error!(stage = %self.stage, "failed to write failure banner: {write_err:#}");
                        StageStatus::WriteFailed {
                            error: format!("{error}; banner write failed: {write_err:#}"),
                        }
                    }
                };
                StageOutcome {
                    stage: self.stage,
                    output_path: input.output_path.to_path_buf(),
                    status,
                    content: banner,
                }
            }
        }
    }

    fn generate_and_write(&self, input: &StageInput<'_>) -> Result<String> {
        let prompt = self.build_prompt(input)?;
        let content = self.gateway.generate(&prompt)?;
        self.writer.write(input.output_path, &content)?;
        Ok(content)
    }

    fn build_prompt(&self, input: &StageInput<'_>) -> Result<String> {
        let analysis_json = serde_json::to_string_pretty(input.analysis)?;
        let prompt = match self.stage {
            Stage::Plan => prompts::plan_prompt(&analysis_json, input.context),
            Stage::Transform => prompts::transform_prompt(&analysis_json, input.context),
            Stage::Validate => {
                prompts::validation_prompt(&analysis_json, input.generated_sql, input.context)
            }
            Stage::Optimize => {
                prompts::optimization_prompt(&analysis_json, input.generated_sql, input.context)
            }
            Stage::Analyze => return Err(anyhow!("the analyze stage does not write an artifact")),
        };
        Ok(prompt)
    }
}

/// Human-readable text written in place of an artifact whose generation failed.
#[must_use]
pub fn failure_banner(stage: Stage, error: &str) -> String {
    match stage {
        Stage::Plan => format!("# Migration Plan Generation Failed\n\nAn error occurred: {error}\n"),
        Stage::Transform => format!("-- SQL Generation Failed\n-- An error occurred: {error}\n"),
        Stage::Validate => {
            format!("-- Validation SQL Generation Failed\n-- An error occurred: {error}\n")
        }
        Stage::Optimize => {
            format!("-- Optimization SQL Generation Failed\n-- An error occurred: {error}\n")
        }
        Stage::Analyze => format!("Schema Analysis Failed: {error}\n"),
    }
}

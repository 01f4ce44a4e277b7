use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use axon_domain::{ensure_non_empty, Stage};
use axon_provider::GatewayConfig;
use serde::{Deserialize, Serialize};

/// Which rendering of run memory is injected into prompts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    /// Only the most recent run record.
    #[default]
    Latest,
    /// Every recorded run.
    Full,
}

impl ContextMode {
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "latest" => Some(Self::Latest),
            "full" => Some(Self::Full),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactNames {
    #[serde(default = "default_plan_name")]
    pub plan: String,
    #[serde(default = "default_transform_name")]
    pub transform: String,
    #[serde(default = "default_validate_name")]
    pub validate: String,
    #[serde(default = "default_optimize_name")]
    pub optimize: String,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            plan: default_plan_name(),
            transform: default_transform_name(),
            validate: default_validate_name(),
            optimize: default_optimize_name(),
        }
    }
}

fn default_plan_name() -> String {
    "migration_plan.md".to_string()
}

fn default_transform_name() -> String {
    "schema.sql".to_string()
}

fn default_validate_name() -> String {
    "validation_queries.sql".to_string()
}

fn default_optimize_name() -> String {
    "optimization_suggestions.sql".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

/// Resolved output location of every artifact stage.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ArtifactPaths {
    pub plan: PathBuf,
    pub transform: PathBuf,
    pub validate: PathBuf,
    pub optimize: PathBuf,
}

impl ArtifactPaths {
    #[must_use]
    pub fn in_dir(dir: &Path, names: &ArtifactNames) -> Self {
        Self {
            plan: dir.join(&names.plan),
            transform: dir.join(&names.transform),
            validate: dir.join(&names.validate),
            optimize: dir.join(&names.optimize),
        }
    }

    /// `None` for [`Stage::Analyze`], which writes no artifact.
    #[must_use]
    pub fn path_for(&self, stage: Stage) -> Option<&Path> {
        match stage {
            Stage::Analyze => None,
            Stage::Plan => Some(&self.plan),
            Stage::Transform => Some(&self.transform),
            Stage::Validate => Some(&self.validate),
            Stage::Optimize => Some(&self.optimize),
        }
    }
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(&default_output_dir(), &ArtifactNames::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Defaults to `memory.json` inside `output_dir`.
    #[serde(default)]
    pub memory_path: Option<PathBuf>,
    #[serde(default)]
    pub context_mode: ContextMode,
    #[serde(default)]
    pub artifacts: ArtifactNames,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            memory_path: None,
            context_mode: ContextMode::default(),
            artifacts: ArtifactNames::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn memory_path(&self) -> PathBuf {
        self.memory_path
            .clone()
            .unwrap_or_else(|| self.output_dir.join("memory.json"))
    }

    #[must_use]
    pub fn artifact_paths(&self) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.output_dir, &self.artifacts)
    }

    /// # Errors
    /// Returns an error for blank names, clashing artifact paths, or an invalid gateway section.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("artifacts.plan", &self.artifacts.plan),
            ("artifacts.transform", &self.artifacts.transform),
            ("artifacts.validate", &self.artifacts.validate),
            ("artifacts.optimize", &self.artifacts.optimize),
        ] {
            ensure_non_empty(field, value).map_err(|message| anyhow!(message))?;
        }

        let paths = self.artifact_paths();
        let mut seen = BTreeSet::new();
        seen.insert(self.memory_path());
        for stage in Stage::ARTIFACT_STAGES {
            let Some(path) = paths.path_for(stage) else {
                continue;
            };
            if !seen.insert(path.to_path_buf()) {
                return Err(anyhow!(
                    "artifact path for stage {stage} collides with another output: {}",
                    path.display()
                ));
            }
        }

        self.gateway.validate()
    }
}

/// Load pipeline settings from a YAML file and validate them.
///
/// # Errors
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_config_from_path(path: &Path) -> Result<PipelineConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read pipeline config {}", path.display()))?;
    parse_config_yaml(&content)
}

/// # Errors
/// Returns an error when the YAML is malformed or fails validation.
pub fn parse_config_yaml(yaml: &str) -> Result<PipelineConfig> {
    let config: PipelineConfig = serde_yaml::from_str(yaml)
        .map_err(|err| anyhow!("invalid pipeline config YAML structure: {err}"))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::{parse_config_yaml, ContextMode, PipelineConfig};
    use std::path::PathBuf;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config_yaml("{}");
        assert_eq!(config.ok(), Some(PipelineConfig::default()));
        let config = PipelineConfig::default();
        assert_eq!(config.memory_path(), PathBuf::from("output/memory.json"));
        assert_eq!(
            config.artifact_paths().transform,
            PathBuf::from("output/schema.sql")
        );
    }

    #[test]
    fn overrides_are_applied() {
        let yaml = r"
output_dir: build/migration
memory_path: state/axon-memory.json
context_mode: full
artifacts:
  transform: ddl.sql
gateway:
  model_name: local-test-model
  temperature: 0.2
";
        let config = match parse_config_yaml(yaml) {
            Ok(config) => config,
            Err(err) => panic!("config rejected: {err:#}"),
        };
        assert_eq!(config.context_mode, ContextMode::Full);
        assert_eq!(config.memory_path(), PathBuf::from("state/axon-memory.json"));
        assert_eq!(
            config.artifact_paths().transform,
            PathBuf::from("build/migration/ddl.sql")
        );
        assert_eq!(
            config.artifact_paths().plan,
            PathBuf::from("build/migration/migration_plan.md")
        );
        assert_eq!(config.gateway.model_name, "local-test-model");
    }

    #[test]
    fn colliding_artifact_names_are_rejected() {
        let yaml = "artifacts:\n  validate: schema.sql\n";
        assert!(parse_config_yaml(yaml).is_err());
        let yaml = "artifacts:\n  plan: memory.json\n";
        assert!(parse_config_yaml(yaml).is_err());
    }

    #[test]
    fn unknown_keys_and_blank_names_are_rejected() {
        assert!(parse_config_yaml("outputs: x\n").is_err());
        assert!(parse_config_yaml("artifacts:\n  plan: \"  \"\n").is_err());
    }

    #[test]
    fn context_mode_parses_cli_values() {
        assert_eq!(ContextMode::parse("latest"), Some(ContextMode::Latest));
        assert_eq!(ContextMode::parse("full"), Some(ContextMode::Full));
        assert_eq!(ContextMode::parse("all"), None);
    }
}

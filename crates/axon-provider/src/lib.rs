#![forbid(unsafe_code)]

use std::cell::RefCell;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Text-in, text-out model capability. Any error is fatal to that call only.
pub trait ModelGateway {
    fn model_name(&self) -> &str;

    #[allow(clippy::missing_errors_doc)]
    fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            region: default_region(),
            model_name: default_model_name(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl GatewayConfig {
    /// # Errors
    /// Returns an error when a name is blank or a sampling parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("project_id", &self.project_id),
            ("region", &self.region),
            ("model_name", &self.model_name),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("gateway.{field} MUST be non-empty"));
            }
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(anyhow!(
                "gateway.temperature must be within 0.0..=2.0, got {}",
                self.temperature
            ));
        }
        if self.max_output_tokens == 0 {
            return Err(anyhow!("gateway.max_output_tokens must be positive"));
        }
        Ok(())
    }
}

fn default_project_id() -> String {
    "axon-local".to_string()
}

fn default_region() -> String {
    "us-central1".to_string()
}

fn default_model_name() -> String {
    "gemini-2.5-pro".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_max_output_tokens() -> u32 {
    8192
}

/// Offline gateway that answers every prompt with deterministic dummy text.
#[derive(Debug, Clone)]
pub struct MockGateway {
    config: GatewayConfig,
    adapter_version: String,
}

impl MockGateway {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            adapter_version: "mock.v1".to_string(),
        }
    }

    fn deterministic_token(&self, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.config.model_name.as_bytes());
        hasher.update(self.adapter_version.as_bytes());
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl ModelGateway for MockGateway {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let token = self.deterministic_token(prompt);
        let preview: String = prompt.trim().chars().take(100).collect();
        tracing::debug!(model = %self.config.model_name, "mock gateway answering prompt");
        Ok(format!(
            "This is a dummy response for the prompt: {preview}... [mock:{}]",
            token.chars().take(16).collect::<String>()
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptReply {
    Respond(String),
    Fail(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ScriptRule {
    pub when_prompt_contains: String,
    #[serde(flatten)]
    pub reply: ScriptReply,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ReplyScript {
    #[serde(default)]
    pub rules: Vec<ScriptRule>,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Load a reply script from YAML on disk.
///
/// # Errors
/// Returns an error when the file cannot be read or is not a valid script.
pub fn load_script_from_path(path: &Path) -> Result<ReplyScript> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read reply script {}", path.display()))?;
    let script: ReplyScript = serde_yaml::from_str(&content)
        .map_err(|err| anyhow!("invalid reply script YAML structure: {err}"))?;
    for rule in &script.rules {
        if rule.when_prompt_contains.is_empty() {
            return Err(anyhow!("reply script rule has an empty when_prompt_contains"));
        }
    }
    Ok(script)
}

/// Gateway that replays canned replies. The first rule whose needle occurs in
/// the prompt wins; unmatched prompts get the fallback or fail.
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    config: GatewayConfig,
    script: ReplyScript,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedGateway {
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_script(config, ReplyScript::default())
    }

    #[must_use]
    pub fn with_script(config: GatewayConfig, script: ReplyScript) -> Self {
        Self {
            config,
            script,
            prompts: RefCell::new(Vec::new()),
        }
    }

    /// # Errors
    /// Returns an error when the script file cannot be loaded.
    pub fn from_path(config: GatewayConfig, path: &Path) -> Result<Self> {
        Ok(Self::with_script(config, load_script_from_path(path)?))
    }

    #[must_use]
    pub fn respond(mut self, needle: &str, text: &str) -> Self {
        self.script.rules.push(ScriptRule {
            when_prompt_contains: needle.to_string(),
            reply: ScriptReply::Respond(text.to_string()),
        });
        self
    }

    #[must_use]
    pub fn fail(mut self, needle: &str, message: &str) -> Self {
        self.script.rules.push(ScriptRule {
            when_prompt_contains: needle.to_string(),
            reply: ScriptReply::Fail(message.to_string()),
        });
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, text: &str) -> Self {
        self.script.fallback = Some(text.to_string());
        self
    }

    /// Every prompt received so far, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelGateway for ScriptedGateway {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());

        let matched = self
            .script
            .rules
            .iter()
            .find(|rule| prompt.contains(&rule.when_prompt_contains));
        match matched {
            Some(ScriptRule {
                reply: ScriptReply::Respond(text),
                ..
            }) => Ok(text.clone()),
            Some(ScriptRule {
                reply: ScriptReply::Fail(message),
                when_prompt_contains,
            }) => {
                tracing::debug!(rule = %when_prompt_contains, "scripted gateway failing call");
                Err(anyhow!("scripted failure: {message}"))
            }
            None => self
                .script
                .fallback
                .clone()
                .ok_or_else(|| anyhow!("no scripted reply matches the prompt")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{load_script_from_path, GatewayConfig, MockGateway, ModelGateway, ScriptedGateway};

    #[test]
    fn mock_gateway_output_is_stable_for_same_prompt() {
        let gateway = MockGateway::default();
        let first = gateway.generate("describe the schema");
        let second = gateway.generate("describe the schema");
        assert!(first.is_ok());
        assert_eq!(first.ok(), second.ok());

        let other = gateway.generate("something else");
        assert!(other.is_ok());
        assert_ne!(
            gateway.generate("describe the schema").ok(),
            other.ok()
        );
    }

    #[test]
    fn mock_gateway_token_depends_on_model_name() {
        let a = MockGateway::new(GatewayConfig::default());
        let b = MockGateway::new(GatewayConfig {
            model_name: "other-model".to_string(),
            ..GatewayConfig::default()
        });
        assert_ne!(a.generate("p").ok(), b.generate("p").ok());
    }

    #[test]
    fn scripted_gateway_first_match_wins_and_records_prompts() {
        let gateway = ScriptedGateway::new(GatewayConfig::default())
            .respond("alpha", "first")
            .respond("alp", "second")
            .fail("beta", "quota exceeded");

        assert_eq!(gateway.generate("the alpha prompt").ok(), Some("first".to_string()));
        let failed = gateway.generate("beta prompt");
        assert!(failed.is_err());
        let message = failed.err().map(|err| err.to_string()).unwrap_or_default();
        assert!(message.contains("quota exceeded"));
        assert!(gateway.generate("gamma").is_err());
        assert_eq!(gateway.prompts().len(), 3);
    }

    #[test]
    fn scripted_gateway_fallback_answers_unmatched_prompts() {
        let gateway = ScriptedGateway::new(GatewayConfig::default()).with_fallback("-- ok");
        assert_eq!(gateway.generate("anything").ok(), Some("-- ok".to_string()));
    }

    #[test]
    fn reply_script_loads_from_yaml() {
        let path = std::env::temp_dir().join(format!("axon-script-{}.yaml", std::process::id()));
        let yaml = r##"
rules:
  - when_prompt_contains: "migration strategist"
    respond: "# Plan"
  - when_prompt_contains: "database architect"
    fail: "backend down"
fallback: "-- default"
"##;
        assert!(std::fs::write(&path, yaml).is_ok());
        let script = load_script_from_path(&path);
        let _ = std::fs::remove_file(&path);
        let script = match script {
            Ok(value) => value,
            Err(err) => panic!("script load failed: {err:#}"),
        };
        assert_eq!(script.rules.len(), 2);
        let gateway = ScriptedGateway::with_script(GatewayConfig::default(), script);
        assert_eq!(
            gateway.generate("You are a database migration strategist.").ok(),
            Some("# Plan".to_string())
        );
        assert!(gateway.generate("Act as an expert database architect.").is_err());
        assert_eq!(gateway.generate("x").ok(), Some("-- default".to_string()));
    }

    #[test]
    fn gateway_config_rejects_blank_model() {
        let config = GatewayConfig {
            model_name: " ".to_string(),
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(GatewayConfig::default().validate().is_ok());
    }
}

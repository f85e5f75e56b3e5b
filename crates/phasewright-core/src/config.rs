//! Orchestrator configuration (TOML).
//!
//! Every field has a default, so an empty or missing file is a valid
//! configuration. Per-stage tables override the built-in
//! [`AgentConfig::for_phase`] / [`AgentConfig::for_role`] defaults:
//!
//! ```toml
//! default_provider = "anthropic"
//! max_iterations = 20
//!
//! [phases.testing]
//! execution_mode = "hybrid"
//! allowed_tools = ["run_tests", "read_file"]
//!
//! [roles.pen_tester]
//! workflow_mode = "tips_only"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent::{
    AgentConfig, ExecutionMode, RetryPolicy, WorkflowMode, DEFAULT_MAX_ITERATIONS,
    DEFAULT_MODEL, DEFAULT_PROVIDER,
};
use crate::provider::GenerationConfig;
use crate::stage::{Phase, Role, Stage};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("unknown {table} entry '{name}'")]
    UnknownStage { table: &'static str, name: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Overrides for one phase or role. Unset fields keep the stage default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_mode: Option<WorkflowMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl StageOverride {
    fn apply(&self, config: &mut AgentConfig) {
        if let Some(v) = &self.name {
            config.name = v.clone();
        }
        if let Some(v) = &self.system_prompt {
            config.system_prompt = v.clone();
        }
        if let Some(v) = &self.instructions {
            config.instructions = v.clone();
        }
        if let Some(v) = &self.allowed_tools {
            config.allowed_tools = v.clone();
        }
        if let Some(v) = &self.provider {
            config.provider = v.clone();
        }
        if let Some(v) = &self.model {
            config.model = v.clone();
        }
        if let Some(v) = self.execution_mode {
            config.execution_mode = v;
        }
        if let Some(v) = self.workflow_mode {
            config.workflow_mode = v;
        }
        if let Some(v) = self.max_iterations {
            config.max_iterations = v;
        }
        if let Some(v) = self.temperature {
            config.generation.temperature = v;
        }
        if let Some(v) = self.max_tokens {
            config.generation.max_tokens = v;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub default_provider: String,
    pub default_model: String,
    pub max_iterations: u32,
    /// Feed each stage's output to the next stage as context.
    pub carry_context: bool,
    /// Stop a sequence at the first failed stage.
    pub halt_on_failure: bool,
    pub phase_order: Vec<Phase>,
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
    /// Keyed by phase name, e.g. `design_build`.
    pub phases: BTreeMap<String, StageOverride>,
    /// Keyed by role name, e.g. `pen_tester`.
    pub roles: BTreeMap<String, StageOverride>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            carry_context: true,
            halt_on_failure: true,
            phase_order: Phase::ALL.to_vec(),
            generation: GenerationConfig::default(),
            retry: RetryPolicy::default(),
            phases: BTreeMap::new(),
            roles: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be > 0".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be > 0".into()));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::Invalid(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms".into(),
            ));
        }
        if self.phase_order.is_empty() {
            return Err(ConfigError::Invalid("phase_order must not be empty".into()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.phase_order.iter().find(|p| !seen.insert(**p)) {
            return Err(ConfigError::Invalid(format!(
                "phase_order lists '{dup}' more than once"
            )));
        }
        check_temperature("generation.temperature", self.generation.temperature)?;
        if self.default_provider.trim().is_empty() {
            return Err(ConfigError::Invalid("default_provider must not be empty".into()));
        }

        for (stage, table) in self.overrides()? {
            if table.max_iterations == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{stage}: max_iterations must be > 0"
                )));
            }
            if let Some(t) = table.temperature {
                check_temperature(&format!("{stage}: temperature"), t)?;
            }
        }
        Ok(())
    }

    /// Every override table with its parsed stage.
    pub fn overrides(&self) -> ConfigResult<Vec<(Stage, &StageOverride)>> {
        let mut out = Vec::with_capacity(self.phases.len() + self.roles.len());
        for (name, table) in &self.phases {
            let phase: Phase = name.parse().map_err(|_| ConfigError::UnknownStage {
                table: "phases",
                name: name.clone(),
            })?;
            out.push((Stage::Phase(phase), table));
        }
        for (name, table) in &self.roles {
            let role: Role = name.parse().map_err(|_| ConfigError::UnknownStage {
                table: "roles",
                name: name.clone(),
            })?;
            out.push((Stage::Role(role), table));
        }
        Ok(out)
    }

    fn override_for(&self, stage: Stage) -> Option<&StageOverride> {
        match stage {
            Stage::Phase(p) => self
                .phases
                .iter()
                .find(|(k, _)| k.parse::<Phase>().ok() == Some(p))
                .map(|(_, v)| v),
            Stage::Role(r) => self
                .roles
                .iter()
                .find(|(k, _)| k.parse::<Role>().ok() == Some(r))
                .map(|(_, v)| v),
        }
    }

    /// Stage defaults, then global settings, then the stage's own table.
    pub fn agent_config(&self, stage: Stage) -> AgentConfig {
        let mut config = AgentConfig::for_stage(stage)
            .with_provider(&self.default_provider, &self.default_model)
            .with_max_iterations(self.max_iterations)
            .with_retry(self.retry);
        config.generation = self.generation;
        if let Some(table) = self.override_for(stage) {
            table.apply(&mut config);
        }
        config
    }
}

fn check_temperature(field: &str, value: f64) -> ConfigResult<()> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be within [0, 2], got {value}"
        )));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> ConfigResult<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = parse_config(&contents).map_err(|e| match e {
        ConfigError::Parse { source, .. } => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })?;
    Ok(cfg)
}

/// Parse and validate config from a TOML string.
pub fn parse_config(contents: &str) -> ConfigResult<OrchestratorConfig> {
    let cfg: OrchestratorConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn stage_tables_override_defaults() {
        let cfg = parse_config(
            r#"
            default_provider = "gemini"
            default_model = "gemini-2.5-pro"
            max_iterations = 8

            [phases.testing]
            execution_mode = "manual"
            allowed_tools = ["run_tests", "read_file"]

            [roles.pen-tester]
            workflow_mode = "manual_with_tips"
            temperature = 0.0
            "#,
        )
        .expect("parse");

        let testing = cfg.agent_config(Stage::Phase(Phase::Testing));
        assert_eq!(testing.provider, "gemini");
        assert_eq!(testing.max_iterations, 8);
        assert_eq!(testing.execution_mode, ExecutionMode::Manual);
        assert_eq!(testing.allowed_tools, vec!["run_tests", "read_file"]);

        let pen = cfg.agent_config(Stage::Role(Role::PenTester));
        assert_eq!(pen.workflow_mode, WorkflowMode::ManualWithTips);
        assert_eq!(pen.generation.temperature, 0.0);

        let discovery = cfg.agent_config(Stage::Phase(Phase::Discovery));
        assert!(discovery.allowed_tools.is_empty());
    }

    #[test]
    fn unknown_stage_table_is_rejected() {
        let err = parse_config("[phases.qa]\nmax_iterations = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStage { table: "phases", .. }));
    }

    #[test]
    fn validation_catches_bad_values() {
        assert!(parse_config("max_iterations = 0").is_err());
        assert!(parse_config("phase_order = []").is_err());
        assert!(parse_config(r#"phase_order = ["testing", "testing"]"#).is_err());
        assert!(parse_config("[generation]\ntemperature = 3.5").is_err());
        assert!(parse_config("[retry]\nmax_attempts = 0").is_err());
    }

    #[test]
    fn parse_error_names_the_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("phasewright.toml");
        std::fs::write(&path, "max_iterations = \"many\"").unwrap();
        match load_config(&path) {
            Err(ConfigError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}

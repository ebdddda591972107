use cascade_bot::bot::{Difficulty, SearchConfig};
use cascade_core::model::agent::AgentId;
use cascade_core::model::deck::Deck;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_AGENTS_PER_TABLE: usize = 4;
const DEFAULT_HAND_SIZE: usize = 4;
const DEFAULT_MAX_TURNS: u32 = 80;
const MAX_HAND_SIZE: usize = 8;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root self-play configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BenchmarkConfig {
    pub run_id: String,
    pub games: GameConfig,
    pub agents: Vec<AgentConfig>,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl BenchmarkConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: BenchmarkConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        check_identifier("run_id", &self.run_id)?;
        self.games.validate()?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        validate_agents(&self.agents)?;
        Ok(())
    }

    /// Resolve `{run_id}` placeholders into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_json: resolve_template(&self.run_id, &self.outputs.summary_json),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GameConfig {
    pub seed: Option<u64>,
    pub count: usize,
    #[serde(default = "default_agents_per_table")]
    pub agents_per_table: usize,
    #[serde(default = "default_hand_size")]
    pub hand_size: usize,
    /// Turn ceiling enforced by the referee.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

impl GameConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(invalid("games.count", "number of games must be greater than zero"));
        }
        if !(2..=AgentId::MAX_TABLE).contains(&self.agents_per_table) {
            return Err(invalid(
                "games.agents_per_table",
                format!("table size must be between 2 and {}", AgentId::MAX_TABLE),
            ));
        }
        if !(1..=MAX_HAND_SIZE).contains(&self.hand_size) {
            return Err(invalid(
                "games.hand_size",
                format!("hand size must be between 1 and {MAX_HAND_SIZE}"),
            ));
        }
        // One card opens the discard pile and at least one must stay in the deck.
        let dealt = self.hand_size * self.agents_per_table;
        if dealt + 2 > Deck::SIZE {
            return Err(invalid(
                "games.hand_size",
                format!("{dealt} dealt cards leave no deck out of {}", Deck::SIZE),
            ));
        }
        if self.max_turns == 0 {
            return Err(invalid("games.max_turns", "turn ceiling must be greater than zero"));
        }
        Ok(())
    }
}

fn default_agents_per_table() -> usize {
    DEFAULT_AGENTS_PER_TABLE
}

fn default_hand_size() -> usize {
    DEFAULT_HAND_SIZE
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

/// One participant; seats rotate through the agent list game by game.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub iterations: Option<usize>,
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
    /// Stop searches on the iteration cap only, for reproducible runs.
    #[serde(default = "default_deterministic")]
    pub deterministic: bool,
}

impl AgentConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        check_identifier("agents.name", &self.name)?;
        let field = |suffix: &str| format!("agents[{}].{suffix}", self.name);
        if self.iterations == Some(0) {
            return Err(invalid(field("iterations"), "iteration cap must be greater than zero"));
        }
        if self.time_budget_ms == Some(0) {
            return Err(invalid(field("time_budget_ms"), "time budget must be greater than zero"));
        }
        Ok(())
    }

    /// Difficulty preset with this agent's overrides applied.
    pub fn search_config(&self) -> SearchConfig {
        let mut config = SearchConfig::for_difficulty(self.difficulty)
            .with_deterministic(self.deterministic);
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(millis) = self.time_budget_ms {
            config = config.with_time_budget_ms(millis);
        }
        config
    }
}

fn default_deterministic() -> bool {
    true
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_json: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_json", &self.summary_json),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(label, "path must not be empty"));
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(invalid(label, "resolved path is invalid"));
            }
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    /// Parsed `tracing_level`; unknown names fall back to the caller's default.
    pub fn level(&self) -> Option<Level> {
        self.tracing_level.trim().parse().ok()
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

/// Run ids and agent names end up in file names and JSON keys.
fn check_identifier(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if let Some(bad) = value.chars().find(|c| !RUN_ID_ALLOWED.contains(*c)) {
        return Err(invalid(
            field,
            format!("'{value}' contains '{bad}'; use letters, digits, '.', '_' or '-'"),
        ));
    }
    Ok(())
}

fn validate_agents(agents: &[AgentConfig]) -> Result<(), ValidationError> {
    if agents.is_empty() {
        return Err(invalid("agents", "at least one agent must be specified"));
    }
    let mut seen = HashSet::new();
    for agent in agents {
        agent.validate()?;
        if !seen.insert(agent.name.as_str()) {
            return Err(invalid(
                "agents",
                format!("agent name '{}' defined more than once", agent.name),
            ));
        }
    }
    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    PathBuf::from(template.replace("{run_id}", run_id))
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_json: PathBuf,
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        field: field.into(),
        message: message.into(),
    }
}

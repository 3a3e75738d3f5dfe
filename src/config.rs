//! Runtime configuration.
//!
//! TOML-backed settings for the session log, the turn orchestrator, and the
//! tag-stream parser. Everything has a working default; a missing file or an
//! empty table is a valid configuration. Loading is split from IO so tests
//! can parse from strings.

use serde::Deserialize;
use std::path::Path;

use crate::error::ConfigError;
use crate::stream::tag_parser::DEFAULT_THINKING_ALIASES;

const DEFAULT_MAX_NODES: usize = 320;
const DEFAULT_MAX_CHECKOUTS: usize = 64;
const DEFAULT_REGISTRY_CAPACITY: usize = 256;
const DEFAULT_MAX_ITERATIONS: usize = 20;
const DEFAULT_HISTORY_LIMIT: usize = 64;

/// Top-level runtime configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub session: SessionConfig,
    pub agent: AgentConfig,
    pub parser: ParserConfig,
}

/// Session-log retention settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Node retention cap per log; oldest prunable nodes drop first.
    pub max_nodes: usize,
    /// Checkout-record ring size per log.
    pub max_checkouts: usize,
    /// Live-log cap for the registry, oldest-created evicted first.
    pub registry_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_nodes: DEFAULT_MAX_NODES,
            max_checkouts: DEFAULT_MAX_CHECKOUTS,
            registry_capacity: DEFAULT_REGISTRY_CAPACITY,
        }
    }
}

/// Turn-orchestrator behavior settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Safety cap on model-call iterations within one turn.
    pub max_iterations: usize,
    /// Most recent conversational nodes included per request.
    pub history_limit: usize,
    /// Operator instructions prepended to every request.
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            history_limit: DEFAULT_HISTORY_LIMIT,
            system_prompt: String::new(),
        }
    }
}

/// Tag-stream parser settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Tag names treated as thinking blocks (matched case-insensitively).
    pub thinking_aliases: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            thinking_aliases: DEFAULT_THINKING_ALIASES
                .iter()
                .map(|alias| alias.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_toml_str(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.max_nodes == 0 {
            return Err(ConfigError::Invalid("session.max_nodes must be > 0".into()));
        }
        if self.session.registry_capacity == 0 {
            return Err(ConfigError::Invalid(
                "session.registry_capacity must be > 0".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "agent.max_iterations must be > 0".into(),
            ));
        }
        if self.agent.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "agent.history_limit must be > 0".into(),
            ));
        }
        if self.parser.thinking_aliases.is_empty() {
            return Err(ConfigError::Invalid(
                "parser.thinking_aliases must not be empty".into(),
            ));
        }
        Ok(())
    }
}

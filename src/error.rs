//! Unified error types for the assistant core.

use std::fmt;

// ---------------------------------------------------------------------------
// MarkerError
// ---------------------------------------------------------------------------

/// Errors from an invalid marker definition supplied at parser construction.
///
/// This is the only construction-time failure in the crate; everything else
/// reports problems through result payloads instead of errors.
#[derive(Debug)]
pub enum MarkerError {
    /// A thinking alias was empty after trimming.
    EmptyAlias,
    /// A thinking alias contained characters outside `[A-Za-z0-9_]`.
    InvalidAlias(String),
}

impl fmt::Display for MarkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAlias => write!(f, "empty marker alias"),
            Self::InvalidAlias(alias) => write!(f, "invalid marker alias: {alias}"),
        }
    }
}

impl std::error::Error for MarkerError {}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Errors arising from tool execution.
#[derive(Debug)]
pub enum ToolError {
    /// The model supplied arguments the tool couldn't parse.
    InvalidArguments(String),
    /// The tool ran but encountered a failure.
    ExecutionFailed(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ExecutionFailed(msg) => write!(f, "execution failed: {msg}"),
        }
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// CompletionError
// ---------------------------------------------------------------------------

/// Errors from the upstream completion service.
///
/// The transport itself lives outside this crate; implementations of
/// [`crate::completion::CompletionClient`] map their failures into these
/// variants.
#[derive(Debug)]
pub enum CompletionError {
    /// Transport-level failure reported by the client implementation.
    Transport(String),
    /// The stream ended before any finish signal was observed.
    TruncatedStream,
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::TruncatedStream => write!(f, "stream closed before finish signal"),
        }
    }
}

impl std::error::Error for CompletionError {}

// ---------------------------------------------------------------------------
// OrchestratorError — top-level
// ---------------------------------------------------------------------------

/// Top-level error type for the turn orchestrator.
#[derive(Debug)]
pub enum OrchestratorError {
    Config(ConfigError),
    Completion(CompletionError),
    Tool(ToolError),
    /// The turn loop exceeded the configured iteration cap.
    MaxIterationsReached,
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Completion(e) => write!(f, "completion: {e}"),
            Self::Tool(e) => write!(f, "tool: {e}"),
            Self::MaxIterationsReached => write!(f, "max turn loop iterations reached"),
        }
    }
}

impl std::error::Error for OrchestratorError {}

impl From<ConfigError> for OrchestratorError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<CompletionError> for OrchestratorError {
    fn from(e: CompletionError) -> Self {
        Self::Completion(e)
    }
}

impl From<ToolError> for OrchestratorError {
    fn from(e: ToolError) -> Self {
        Self::Tool(e)
    }
}

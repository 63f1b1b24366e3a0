//! Error types for the coordination framework

use thiserror::Error;

/// Errors that can occur during agent coordination
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// Agent not found
    #[error("Agent not found: {0}")]
    NotFound(String),

    /// Agent execution failed
    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),

    /// Agent or oracle timeout
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Coordination was cancelled by the caller
    #[error("Coordination cancelled")]
    Cancelled,

    /// The inference service could not produce a completion
    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create a new NotFound error
    pub fn not_found(agent_id: impl Into<String>) -> Self {
        Self::NotFound(agent_id.into())
    }

    /// Create a new ExecutionFailed error
    pub fn execution_failed(reason: impl Into<String>) -> Self {
        Self::ExecutionFailed(reason.into())
    }

    /// Create a new Timeout error
    pub fn timeout(ms: u64) -> Self {
        Self::Timeout(ms)
    }

    /// Create a new InferenceFailed error
    pub fn inference_failed(reason: impl Into<String>) -> Self {
        Self::InferenceFailed(reason.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(reason.into())
    }

    /// Create a new ConfigError
    pub fn config_error(reason: impl Into<String>) -> Self {
        Self::ConfigError(reason.into())
    }

    /// Create a new Internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }

    /// Whether this error is the caller-requested cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        Self::ConfigError(err.to_string())
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::InferenceFailed(err.to_string())
    }
}

/// Result type for coordination operations
pub type Result<T> = std::result::Result<T, AgentError>;

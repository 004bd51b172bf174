//! Error types for the planning and ranking agents.

use thiserror::Error;

/// Errors that can occur during agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Candidate generation failed.
    #[error("Candidate generation failed: {0}")]
    GenerationFailed(String),

    /// Candidate ranking failed.
    #[error("Candidate ranking failed: {0}")]
    RankingFailed(String),

    /// Error from the LLM provider.
    #[error("LLM error: {0}")]
    LlmError(String),

    /// Error parsing LLM response.
    #[error("Failed to parse LLM response: {0}")]
    ResponseParseError(String),

    /// Configuration error.
    #[error("Agent configuration error: {0}")]
    ConfigurationError(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<crate::error::LlmError> for AgentError {
    fn from(err: crate::error::LlmError) -> Self {
        AgentError::LlmError(err.to_string())
    }
}

impl From<crate::utils::JsonExtractionError> for AgentError {
    fn from(err: crate::utils::JsonExtractionError) -> Self {
        AgentError::ResponseParseError(err.to_string())
    }
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

//! Error types for qa-forge operations.
//!
//! Subsystem-specific errors live next to their subsystems
//! (`StoreError`, `ConfigError`, `AgentError`, `PipelineError`); this module
//! holds the ones shared across several of them:
//! - LLM API interactions
//! - Artifact capture backends

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

/// Errors raised inside an artifact capture backend.
///
/// These never cross the capture boundary: backends fold them into an
/// `error` entry of the returned `ArtifactSet`.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture runtime not available: {0}")]
    RuntimeUnavailable(String),

    #[error("Navigation to '{url}' failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("Capture timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Capture script exited with code {code}: {stderr}")]
    ScriptFailed { code: i32, stderr: String },

    #[error("Invalid capture output: {0}")]
    InvalidOutput(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

//! Error types for the agent orchestration core

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Tool Pipeline Errors
    // =============================

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Batch of {size} items exceeds limit of {max} for tool {tool}")]
    BatchTooLarge {
        tool: String,
        size: usize,
        max: usize,
    },

    // =============================
    // External Collaborators
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM call timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Store call timed out after {0}s")]
    StoreTimeout(u64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Audit error: {0}")]
    AuditError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

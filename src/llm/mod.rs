//! Language-model completion service
//!
//! The model is advisory and unreliable; every caller goes through
//! [`complete_bounded`] and keeps a deterministic fallback.

use crate::error::OrchestrationError;
use crate::Result;
use std::time::Duration;
use tracing::warn;

pub mod gemini;
pub mod mock;

pub use gemini::GeminiClient;
pub use mock::{ScriptedCompletion, ScriptedReply};

#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Label used in provenance tags ("Gemini AI", ...)
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String>;
}

/// Run a completion with a caller-visible timeout.
pub async fn complete_bounded(
    service: &dyn CompletionService,
    prompt: &str,
    system_prompt: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    match tokio::time::timeout(timeout, service.complete(prompt, system_prompt)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                service = service.name(),
                timeout_secs = timeout.as_secs(),
                "Completion call timed out"
            );
            Err(OrchestrationError::LlmTimeout(timeout.as_secs()))
        }
    }
}

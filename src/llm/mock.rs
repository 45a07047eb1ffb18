//! Scripted completion service (no network)
//!
//! Replies are chosen in order: first matching `respond_when` rule on the
//! prompt, then the next queued reply, then the fallback.

use crate::error::OrchestrationError;
use crate::llm::CompletionService;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
}

pub struct ScriptedCompletion {
    rules: Vec<(String, ScriptedReply)>,
    queue: Mutex<VecDeque<ScriptedReply>>,
    fallback: ScriptedReply,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn always(text: &str) -> Self {
        Self::with_fallback(ScriptedReply::Text(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with_fallback(ScriptedReply::Fail(message.to_string()))
    }

    fn with_fallback(fallback: ScriptedReply) -> Self {
        Self {
            rules: Vec::new(),
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `text` whenever the prompt contains `needle` (case-insensitive).
    pub fn respond_when(mut self, needle: &str, text: &str) -> Self {
        self.rules
            .push((needle.to_lowercase(), ScriptedReply::Text(text.to_string())));
        self
    }

    pub fn then(mut self, reply: ScriptedReply) -> Self {
        self.queue.get_mut().push_back(reply);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received so far, oldest first
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait::async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "Scripted AI"
    }

    async fn complete(&self, prompt: &str, _system_prompt: Option<&str>) -> crate::Result<String> {
        self.prompts.lock().await.push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let lowered = prompt.to_lowercase();
        let reply = match self.rules.iter().find(|(needle, _)| lowered.contains(needle)) {
            Some((_, reply)) => reply.clone(),
            None => self
                .queue
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone()),
        };

        match reply {
            ScriptedReply::Text(text) => Ok(text),
            ScriptedReply::Fail(message) => Err(OrchestrationError::LlmError(message)),
        }
    }
}

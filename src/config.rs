//! Runtime configuration
//!
//! Every knob has a default; environment variables override them.
//! Binaries call `dotenv::dotenv()` before `AgentConfig::from_env()`.

use crate::error::OrchestrationError;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODE_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_HIGHLIGHT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Lifetime of an activated Action mode
    pub mode_timeout: Duration,
    /// Mean step confidence below which alternatives are highlighted
    pub highlight_threshold: f64,
    pub llm_timeout: Duration,
    pub store_timeout: Duration,
    /// Pause between sequential batch items
    pub batch_delay: Duration,
    pub response_summary_chars: usize,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode_timeout: Duration::from_secs(DEFAULT_MODE_TIMEOUT_SECS),
            highlight_threshold: DEFAULT_HIGHLIGHT_THRESHOLD,
            llm_timeout: Duration::from_secs(20),
            store_timeout: Duration::from_secs(5),
            batch_delay: Duration::from_millis(100),
            response_summary_chars: 500,
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
        }
    }
}

impl AgentConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (used by `from_env` and tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let mode_timeout = parse_var::<u64, _>(&lookup, "AGENT_MODE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.mode_timeout);

        let highlight_threshold = parse_var::<f64, _>(&lookup, "AGENT_HIGHLIGHT_THRESHOLD")?
            .unwrap_or(defaults.highlight_threshold);

        if !(0.0..=1.0).contains(&highlight_threshold) {
            return Err(OrchestrationError::ConfigError(format!(
                "AGENT_HIGHLIGHT_THRESHOLD must be within [0, 1], got {}",
                highlight_threshold
            )));
        }

        let llm_timeout = parse_var::<u64, _>(&lookup, "AGENT_LLM_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.llm_timeout);

        let store_timeout = parse_var::<u64, _>(&lookup, "AGENT_STORE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.store_timeout);

        let batch_delay = parse_var::<u64, _>(&lookup, "AGENT_BATCH_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay);

        let response_summary_chars =
            parse_var::<usize, _>(&lookup, "AGENT_RESPONSE_SUMMARY_CHARS")?
                .unwrap_or(defaults.response_summary_chars);

        let gemini_api_key = lookup("GEMINI_API_KEY")
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty() && key != "your_gemini_api_key_here");

        let gemini_model = lookup("GEMINI_MODEL")
            .filter(|model| !model.trim().is_empty())
            .unwrap_or(defaults.gemini_model);

        Ok(Self {
            mode_timeout,
            highlight_threshold,
            llm_timeout,
            store_timeout,
            batch_delay,
            response_summary_chars,
            gemini_api_key,
            gemini_model,
        })
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            OrchestrationError::ConfigError(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
    }
}

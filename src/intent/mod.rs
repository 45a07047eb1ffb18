//! Intent resolution
//!
//! Free text is routed in three stages: special mode commands, descriptor
//! trigger phrases, then the language model as an advisory classifier.
//! Resolution never fails; anything unusable becomes [`Intent::none`].

use crate::llm::{complete_bounded, CompletionService};
use crate::models::{
    BatchSupport, Intent, RequiredMode, ToolDescriptor, CONFIRMED_PARAM, NONE_TOOL,
};
use crate::structured::parse_structured;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Meta-operations on the orchestrator's own state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCommand {
    ActivateActionMode,
    DeactivateActionMode,
    ModeStatus,
}

// Deactivation phrases contain the activation ones ("de-aktiviere"), so they go first.
const DEACTIVATE_PHRASES: &[&str] = &[
    "deaktiviere aktions-modus",
    "aktions-modus deaktivieren",
    "beende aktions-modus",
    "deactivate action mode",
];

const ACTIVATE_PHRASES: &[&str] = &[
    "aktiviere aktions-modus",
    "aktions-modus aktivieren",
    "activate action mode",
];

const STATUS_PHRASES: &[&str] = &["welcher modus", "aktueller modus", "current mode"];

/// Lower-case and unify the spellings of "Aktions-Modus"
fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .replace("aktionsmodus", "aktions-modus")
        .replace("aktions modus", "aktions-modus")
}

pub fn detect_special_command(text: &str) -> Option<SpecialCommand> {
    let lowered = normalize(text);
    let any = |phrases: &[&str]| phrases.iter().any(|p| lowered.contains(p));

    if any(DEACTIVATE_PHRASES) {
        Some(SpecialCommand::DeactivateActionMode)
    } else if any(ACTIVATE_PHRASES) {
        Some(SpecialCommand::ActivateActionMode)
    } else if any(STATUS_PHRASES) {
        Some(SpecialCommand::ModeStatus)
    } else {
        None
    }
}

/// Shape the model is asked to answer with; both casings are accepted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IntentPayload {
    #[serde(default, alias = "tool_name", alias = "tool")]
    tool_name: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default, alias = "requires_action_mode")]
    requires_action_mode: Option<bool>,
    #[serde(default, alias = "isBatchOperation", alias = "is_batch")]
    is_batch: Option<bool>,
    #[serde(default, alias = "batch_items")]
    batch_items: Option<Vec<Value>>,
}

pub struct IntentResolver {
    completion: Arc<dyn CompletionService>,
    timeout: Duration,
}

impl IntentResolver {
    pub fn new(completion: Arc<dyn CompletionService>, timeout: Duration) -> Self {
        Self {
            completion,
            timeout,
        }
    }

    /// Resolve `text` against the available tools.
    pub async fn resolve(&self, text: &str, tools: &[&ToolDescriptor]) -> Intent {
        if let Some(intent) = match_trigger(text, tools) {
            info!(tool_name = %intent.tool_name, "Intent resolved by trigger phrase");
            return intent;
        }

        if tools.is_empty() {
            return Intent::none();
        }

        let prompt = intent_prompt(text, tools);
        let completion =
            match complete_bounded(self.completion.as_ref(), &prompt, None, self.timeout).await {
                Ok(completion) => completion,
                Err(e) => {
                    warn!("Intent completion failed, using chat fallback: {}", e);
                    return Intent::none();
                }
            };

        match parse_structured::<IntentPayload>(&completion) {
            Ok(payload) => intent_from_payload(payload, tools, confirmation_given(text)),
            Err(e) => {
                warn!("Unusable intent completion ({}), using chat fallback", e);
                Intent::none()
            }
        }
    }
}

fn intent_prompt(text: &str, tools: &[&ToolDescriptor]) -> String {
    let tool_lines: Vec<String> = tools
        .iter()
        .map(|t| {
            let params: Vec<&str> = t.parameters.iter().map(|p| p.name.as_str()).collect();
            format!(
                "- {}: {} (Modus: {}, Parameter: {}, Batch: {})",
                t.name,
                t.capability_summary,
                required_mode_label(t.required_mode),
                if params.is_empty() { "-".to_string() } else { params.join(", ") },
                if t.supports_batch() { "ja" } else { "nein" }
            )
        })
        .collect();

    format!(
        r#"Analysiere die folgende Benutzeranfrage und bestimme:
1. Welches Tool am besten passt
2. Welche Parameter extrahiert werden können
3. Ob es sich um eine Batch-Operation handelt

Verfügbare Tools:
{}

Benutzeranfrage: "{}"

Antworte ausschließlich im JSON-Format:
{{
  "toolName": "name_des_tools oder '{}'",
  "params": {{ ... }},
  "requiresActionMode": true/false,
  "isBatchOperation": true/false,
  "batchItems": ["id1", "id2"] oder null
}}"#,
        tool_lines.join("\n"),
        text,
        NONE_TOOL
    )
}

fn required_mode_label(mode: RequiredMode) -> &'static str {
    match mode {
        RequiredMode::Explain => "explain",
        RequiredMode::Action => "action",
        RequiredMode::Both => "both",
    }
}

fn intent_from_payload(
    payload: IntentPayload,
    tools: &[&ToolDescriptor],
    confirmed: bool,
) -> Intent {
    let Some(name) = payload.tool_name.map(|n| n.trim().to_string()) else {
        return Intent::none();
    };
    if name.is_empty() || name == NONE_TOOL {
        debug!("Model chose no tool");
        return Intent::none();
    }

    let Some(descriptor) = tools.iter().find(|t| t.name == name) else {
        warn!(tool_name = %name, "Model named an unknown tool, using chat fallback");
        return Intent::none();
    };

    let params = match payload.params {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    let items: Vec<String> = payload
        .batch_items
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match item {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect();
    let is_batch = payload.is_batch.unwrap_or(false) && !items.is_empty();

    build_intent(
        descriptor,
        params,
        items,
        is_batch,
        payload.requires_action_mode.unwrap_or(false),
        confirmed,
    )
}

/// The descriptor's authorization always wins over what the model claimed.
///
/// For confirmation-gated tools only the user's own words can confirm;
/// a `confirmed` param proposed by the model is dropped.
fn build_intent(
    descriptor: &ToolDescriptor,
    mut params: Map<String, Value>,
    items: Vec<String>,
    is_batch: bool,
    claimed_action: bool,
    confirmed: bool,
) -> Intent {
    if descriptor.requires_confirmation {
        params.remove(CONFIRMED_PARAM);
        if confirmed {
            params.insert(CONFIRMED_PARAM.to_string(), Value::Bool(true));
        }
    }

    if let (Some(id_param), Some(first)) = (item_param(descriptor), items.first()) {
        params
            .entry(id_param.to_string())
            .or_insert_with(|| Value::String(first.clone()));
    }

    Intent {
        tool_name: descriptor.name.clone(),
        params: Value::Object(params),
        requires_action_mode: claimed_action || descriptor.required_mode == RequiredMode::Action,
        is_batch,
        batch_items: if is_batch { items } else { Vec::new() },
    }
}

/// Parameter an item id is passed under
fn item_param(descriptor: &ToolDescriptor) -> Option<&str> {
    match &descriptor.batch {
        BatchSupport::PerItem { item_param, .. } => Some(item_param.as_str()),
        BatchSupport::Unsupported => descriptor
            .parameters
            .iter()
            .find(|p| p.required)
            .map(|p| p.name.as_str()),
    }
}

// ===== Trigger phrases =====

const TOKEN_PUNCTUATION: &[char] = &[',', '.', ';', ':', '!', '?', '(', ')', '"', '\'', '[', ']'];

const CONFIRMATION_WORDS: &[&str] = &["bestätigt", "bestätige", "confirm", "confirmed"];

const ID_SEPARATORS: &[char] = &['-', '_', '/'];

fn confirmation_given(text: &str) -> bool {
    text.split_whitespace()
        .map(|t| t.trim_matches(TOKEN_PUNCTUATION).to_lowercase())
        .any(|t| CONFIRMATION_WORDS.contains(&t.as_str()))
}

/// A digit plus a letter or separator; bare numbers such as years are not ids.
fn is_item_id(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
        && token
            .chars()
            .any(|c| c.is_alphabetic() || ID_SEPARATORS.contains(&c))
}

/// Longest trigger phrase present in `text`, followed by at least one id.
///
/// Ids are the id-shaped tokens after the phrase.
fn match_trigger(text: &str, tools: &[&ToolDescriptor]) -> Option<Intent> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let lowered: Vec<String> = tokens
        .iter()
        .map(|t| t.trim_matches(TOKEN_PUNCTUATION).to_lowercase())
        .collect();

    let mut best: Option<(&ToolDescriptor, usize, usize)> = None;

    for &descriptor in tools {
        for phrase in &descriptor.trigger_phrases {
            let words: Vec<&str> = phrase.split_whitespace().collect();
            if words.is_empty() || words.len() > lowered.len() {
                continue;
            }

            let found = (0..=lowered.len() - words.len())
                .find(|&start| words.iter().zip(&lowered[start..]).all(|(w, t)| w == t));

            if let Some(start) = found {
                let longer = best.map(|(_, _, len)| words.len() > len).unwrap_or(true);
                if longer {
                    best = Some((descriptor, start + words.len(), words.len()));
                }
            }
        }
    }

    let (descriptor, rest, _) = best?;

    let ids: Vec<String> = tokens[rest..]
        .iter()
        .map(|t| t.trim_matches(TOKEN_PUNCTUATION))
        .filter(|t| is_item_id(t))
        .map(str::to_string)
        .collect();

    if ids.is_empty() {
        debug!(tool_name = %descriptor.name, "Trigger phrase without ids, deferring to model");
        return None;
    }

    let is_batch = ids.len() > 1;
    Some(build_intent(
        descriptor,
        Map::new(),
        ids,
        is_batch,
        false,
        confirmation_given(text),
    ))
}

//! Core data models for the agent orchestration core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Tool name the intent resolver emits when no tool matched
pub const NONE_TOOL: &str = "none";

/// Tool name recorded in the audit log when a request failed before resolution
pub const UNKNOWN_TOOL: &str = "unknown";

/// Parameter a confirmation-gated tool must receive as `true` before it writes
pub const CONFIRMED_PARAM: &str = "confirmed";

//
// ================= Mode =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModeType {
    Explain,
    Action,
}

/// Authorization a tool demands before it may run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequiredMode {
    Explain,
    Action,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMode {
    #[serde(rename = "type")]
    pub mode_type: ModeType,
    pub activated_at: Option<DateTime<Utc>>,
    pub activated_by: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AgentMode {
    /// The implicit mode of every user without stored state.
    pub fn explain() -> Self {
        Self {
            mode_type: ModeType::Explain,
            activated_at: None,
            activated_by: None,
            expires_at: None,
        }
    }

    pub fn is_action(&self) -> bool {
        self.mode_type == ModeType::Action
    }
}

impl Default for AgentMode {
    fn default() -> Self {
        Self::explain()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModeStatus {
    #[serde(rename = "type")]
    pub mode_type: ModeType,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Authorization {
    pub allowed: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationPrompt {
    pub title: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub warning: String,
}

//
// ================= Tool Descriptor =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParameterType,
    pub description: String,
    pub required: bool,
}

/// How a tool handles a list of items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BatchSupport {
    Unsupported,
    /// Each item is passed to `execute` under `item_param`.
    PerItem {
        item_param: String,
        max_batch_size: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub capability_summary: String,
    pub parameters: Vec<ToolParameter>,
    pub required_mode: RequiredMode,
    pub batch: BatchSupport,
    pub requires_confirmation: bool,
    /// Lower-case phrases that route a request to this tool without the language model
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
}

impl ToolDescriptor {
    pub fn supports_batch(&self) -> bool {
        matches!(self.batch, BatchSupport::PerItem { .. })
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        match &self.batch {
            BatchSupport::PerItem { max_batch_size, .. } => Some(*max_batch_size),
            BatchSupport::Unsupported => None,
        }
    }
}

//
// ================= Intent =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub tool_name: String,
    pub params: Value,
    pub requires_action_mode: bool,
    pub is_batch: bool,
    pub batch_items: Vec<String>,
}

impl Intent {
    /// "Use the generic chat fallback."
    pub fn none() -> Self {
        Self {
            tool_name: NONE_TOOL.to_string(),
            params: Value::Object(Default::default()),
            requires_action_mode: false,
            is_batch: false,
            batch_items: Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        self.tool_name == NONE_TOOL
    }
}

//
// ================= Reasoning =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningStep {
    pub observation: String,
    pub inference: String,
    pub confidence: f64,
    pub supporting_data_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlternativeInterpretation {
    pub interpretation: String,
    pub probability: f64,
    pub check_question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReasoningChain {
    pub steps: Vec<ReasoningStep>,
    pub conclusion: String,
    pub alternatives: Vec<AlternativeInterpretation>,
    pub highlight_alternatives: bool,
}

impl ReasoningChain {
    /// Zero-step chain carrying only a message; used on every error path.
    pub fn empty(message: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            conclusion: message.into(),
            alternatives: Vec::new(),
            highlight_alternatives: false,
        }
    }

    pub fn average_confidence(&self) -> f64 {
        average_confidence(&self.steps)
    }
}

/// Mean step confidence; 0 for an empty slice.
pub fn average_confidence(steps: &[ReasoningStep]) -> f64 {
    if steps.is_empty() {
        return 0.0;
    }
    steps.iter().map(|s| s.confidence).sum::<f64>() / steps.len() as f64
}

//
// ================= Quality =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    pub const MEDIUM_THRESHOLD: f64 = 0.65;
    pub const HIGH_THRESHOLD: f64 = 0.85;

    /// Canonical banding of an overall confidence score.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::HIGH_THRESHOLD {
            ConfidenceLevel::High
        } else if score >= Self::MEDIUM_THRESHOLD {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceBreakdown {
    pub data_quality: f64,
    pub pattern_match: f64,
    pub rule_match: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct HistoricalAccuracy {
    pub similar_cases: u32,
    pub correct_predictions: u32,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityIndicators {
    /// Percentage in [0, 100]
    pub data_completeness: f64,
    pub missing_fields: Vec<String>,
    pub rule_conformity: bool,
    pub deviations: Vec<String>,
    pub historical_accuracy: Option<HistoricalAccuracy>,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub confidence_level: ConfidenceLevel,
}

//
// ================= Provenance =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceKind {
    DatabaseRecord,
    RuleReference,
    Calculation,
    AiInference,
    UserInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvenanceInfo {
    pub kind: ProvenanceKind,
    pub source_id: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

//
// ================= Actions =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedActionType {
    Navigate,
    CreateCorrection,
    Export,
    ActivateActionMode,
    MarkResolved,
    ViewDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedAction {
    #[serde(rename = "type")]
    pub action_type: SuggestedActionType,
    pub label: String,
    pub payload: Option<Value>,
    pub requires_confirmation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideOption {
    pub id: String,
    pub label: String,
    pub requires_reasoning: bool,
}

//
// ================= Tool I/O =================
//

/// Per-request context handed to tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub user_id: String,
    pub context_id: Option<String>,
    pub mode: AgentMode,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    pub data: Option<Value>,
    pub reasoning: Option<ReasoningChain>,
    pub quality: Option<QualityIndicators>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceInfo>,
    pub suggested_action: Option<SuggestedAction>,
    #[serde(default)]
    pub override_options: Vec<OverrideOption>,
    pub disclaimer: Option<String>,
}

impl ToolResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            reasoning: None,
            quality: None,
            provenance: Vec::new(),
            suggested_action: None,
            override_options: Vec::new(),
            disclaimer: None,
        }
    }

    /// Failed result with an empty reasoning chain.
    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            reasoning: Some(ReasoningChain::empty(message.clone())),
            message,
            data: None,
            quality: None,
            provenance: Vec::new(),
            suggested_action: None,
            override_options: Vec::new(),
            disclaimer: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ToolResult>,
    pub summary: String,
    pub session_id: String,
    /// 1-based position in the submitted item list → item id
    pub result_index: BTreeMap<usize, String>,
}

//
// ================= Agent Response =================
//

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    pub success: bool,
    pub message: String,
    pub reasoning: Option<ReasoningChain>,
    pub quality: Option<QualityIndicators>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceInfo>,
    pub suggested_action: Option<SuggestedAction>,
    #[serde(default)]
    pub override_options: Vec<OverrideOption>,
    pub disclaimer: Option<String>,
    pub data: Option<Value>,
    pub batch_result: Option<BatchResult>,
    #[serde(default)]
    pub requires_mode_change: bool,
    pub audit_log_id: Option<Uuid>,
}

//
// ================= Audit =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OverrideDecision {
    Accept,
    Reject,
    Modify,
    Ignore,
}

impl OverrideDecision {
    /// Decisions that overrule the AI and spawn an override record
    pub fn is_override(&self) -> bool {
        matches!(self, OverrideDecision::Reject | OverrideDecision::Modify)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserDecision {
    pub decision: OverrideDecision,
    pub reasoning: Option<String>,
    pub decided_at: DateTime<Utc>,
    pub action_taken: Option<String>,
    pub action_result: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub context_id: Option<String>,
    pub user_id: String,
    pub session_id: String,
    pub request_text: String,
    pub request_mode: ModeType,
    pub request_timestamp: DateTime<Utc>,
    pub response_summary: String,
    pub success: bool,
    pub ai_recommendation: Option<String>,
    pub ai_confidence: Option<f64>,
    pub reasoning_chain: Option<ReasoningChain>,
    pub quality_indicators: Option<QualityIndicators>,
    #[serde(default)]
    pub provenance: Vec<ProvenanceInfo>,
    pub tool_name: String,
    pub processing_time_ms: u64,
    /// SHA-256 over the immutable request/response fields
    #[serde(default)]
    pub integrity_hash: String,
    pub decision: Option<UserDecision>,
}

impl AuditLogEntry {
    pub fn is_open(&self) -> bool {
        self.decision.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverrideRecord {
    pub id: Uuid,
    pub audit_log_id: Uuid,
    pub original_recommendation: Option<String>,
    pub ai_confidence: Option<f64>,
    pub wp_decision: OverrideDecision,
    pub wp_reasoning: String,
    pub wp_alternative: Option<String>,
    pub wp_user_id: String,
    pub timestamp: DateTime<Utc>,
    pub data_points_considered: Vec<String>,
}

impl fmt::Display for ModeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeType::Explain => "Erklär-Modus",
            ModeType::Action => "Aktions-Modus",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConfidenceLevel::Low => "NIEDRIG",
            ConfidenceLevel::Medium => "MITTEL",
            ConfidenceLevel::High => "HOCH",
        };
        write!(f, "{}", s)
    }
}

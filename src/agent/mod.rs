//! Orchestrator - the request loop
//!
//! MODE → SPECIAL COMMAND? → INTENT → AUTHORIZE → DISPATCH → RESPOND → AUDIT
//!
//! `process` never returns an error; every failure becomes a failed
//! `AgentResponse` and still produces an audit entry.

use crate::audit::{AuditFilter, AuditRecorder, AuditStatistics, DateRange};
use crate::config::AgentConfig;
use crate::disclaimer;
use crate::intent::{detect_special_command, IntentResolver, SpecialCommand};
use crate::llm::{complete_bounded, CompletionService};
use crate::mode::ModeManager;
use crate::models::{
    ActivationPrompt, AgentContext, AgentMode, AgentResponse, AuditLogEntry, BatchResult, Intent,
    ModeStatus, ModeType, OverrideDecision, OverrideRecord, ReasoningChain, RequiredMode,
    SuggestedAction, SuggestedActionType, ToolDescriptor, ToolResult, NONE_TOOL, UNKNOWN_TOOL,
};
use crate::provenance;
use crate::reasoning::merge_quality;
use crate::tools::{execute_batch, Tool, ToolRegistry};
use crate::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CHAT_UNAVAILABLE: &str = "Entschuldigung, ich kann Ihre Anfrage gerade nicht beantworten. Bitte versuchen Sie es in Kürze erneut.";

fn chat_system_prompt(mode: ModeType) -> String {
    format!(
        "Du bist ein AI-Assistent für die HGB-Konzernkonsolidierung.\n\
         Du hilfst Wirtschaftsprüfern bei der Analyse von Konsolidierungsdaten.\n\
         Aktueller Modus: {}\n\n\
         Beantworte Fragen klar und präzise. Verweise auf HGB-Paragraphen wo relevant.",
        mode
    )
}

/// Main orchestrator that coordinates mode, intent, tools and audit
pub struct Orchestrator {
    config: AgentConfig,
    modes: Arc<ModeManager>,
    registry: ToolRegistry,
    intents: IntentResolver,
    completion: Arc<dyn CompletionService>,
    audit: AuditRecorder,
}

/// What a request resolved to, carried into the audit entry
struct Outcome {
    response: AgentResponse,
    tool_name: String,
}

impl Outcome {
    fn new(response: AgentResponse, tool_name: &str) -> Self {
        Self {
            response,
            tool_name: tool_name.to_string(),
        }
    }
}

impl Orchestrator {
    pub fn new(
        config: AgentConfig,
        modes: Arc<ModeManager>,
        registry: ToolRegistry,
        completion: Arc<dyn CompletionService>,
        audit: AuditRecorder,
    ) -> Self {
        let intents = IntentResolver::new(Arc::clone(&completion), config.llm_timeout);

        Self {
            config,
            modes,
            registry,
            intents,
            completion,
            audit,
        }
    }

    pub fn tools(&self) -> Vec<&ToolDescriptor> {
        self.registry.all()
    }

    /// Handle one free-text request for `user_id`.
    pub async fn process(
        &self,
        text: &str,
        user_id: &str,
        context_id: Option<&str>,
        session_id: Option<&str>,
    ) -> AgentResponse {
        let start_time = Instant::now();
        let request_timestamp = Utc::now();

        let ctx = AgentContext {
            user_id: user_id.to_string(),
            context_id: context_id.map(str::to_string),
            mode: self.modes.current_mode(user_id).await,
            session_id: session_id
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
        };

        info!(
            user_id = %user_id,
            session_id = %ctx.session_id,
            mode = ?ctx.mode.mode_type,
            "Orchestrator: request received"
        );

        // Meta-operations on mode state; no intent, no tool, no audit entry
        if let Some(command) = detect_special_command(text) {
            debug!(command = ?command, "Special command");
            return self.special_command(command, &ctx).await;
        }

        let mut tool_name = UNKNOWN_TOOL.to_string();
        let handled = self.handle(text, &ctx, &mut tool_name).await;
        let outcome = match handled {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(user_id = %user_id, tool_name = %tool_name, "Error processing request: {}", e);
                Outcome {
                    response: failure_response(&format!("Fehler bei der Verarbeitung: {}", e), &ctx),
                    tool_name,
                }
            }
        };

        let mut response = outcome.response;
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            user_id = %user_id,
            tool_name = %outcome.tool_name,
            success = response.success,
            elapsed_ms = processing_time_ms,
            "Orchestrator: request complete"
        );

        response.audit_log_id = self
            .write_audit(
                text,
                &ctx,
                request_timestamp,
                &response,
                &outcome.tool_name,
                processing_time_ms,
            )
            .await;

        response
    }

    /// INTENT → AUTHORIZE → DISPATCH → RESPOND
    async fn handle(&self, text: &str, ctx: &AgentContext, tool_name: &mut String) -> Result<Outcome> {
        let descriptors = self.registry.all();
        let intent = self.intents.resolve(text, &descriptors).await;
        *tool_name = intent.tool_name.clone();

        debug!(
            tool_name = %intent.tool_name,
            is_batch = intent.is_batch,
            requires_action_mode = intent.requires_action_mode,
            "Intent resolved"
        );

        let Some(tool) = self.registry.get(&intent.tool_name) else {
            return Ok(Outcome::new(self.chat_fallback(text, ctx).await, NONE_TOOL));
        };

        let required = if intent.requires_action_mode {
            RequiredMode::Action
        } else {
            tool.descriptor().required_mode
        };

        let authorization = self.modes.authorize(&ctx.user_id, required).await;
        if !authorization.allowed {
            warn!(
                user_id = %ctx.user_id,
                tool_name = %intent.tool_name,
                reason = ?authorization.reason,
                "Action mode required, tool not invoked"
            );
            return Ok(Outcome::new(self.mode_change_response(), &intent.tool_name));
        }

        let response = if self.dispatches_batch(&intent, tool.as_ref()) {
            let batch = execute_batch(
                tool.as_ref(),
                &intent.batch_items,
                &intent.params,
                ctx,
                self.config.batch_delay,
            )
            .await?;
            batch_response(batch, ctx.mode.mode_type)
        } else {
            info!(tool_name = %intent.tool_name, "Dispatching tool");
            let result = tool.execute(&intent.params, ctx).await?;
            single_response(result, ctx.mode.mode_type)
        };

        Ok(Outcome::new(response, &intent.tool_name))
    }

    fn dispatches_batch(&self, intent: &Intent, tool: &dyn Tool) -> bool {
        intent.is_batch && !intent.batch_items.is_empty() && tool.descriptor().supports_batch()
    }

    async fn special_command(&self, command: SpecialCommand, ctx: &AgentContext) -> AgentResponse {
        let user_id = ctx.user_id.as_str();

        match command {
            SpecialCommand::ActivateActionMode => {
                let mode = self.modes.activate(user_id).await;
                let remaining = self
                    .modes
                    .remaining_seconds(user_id)
                    .await
                    .unwrap_or_else(|| self.modes.timeout().as_secs());

                AgentResponse {
                    success: true,
                    message: format!(
                        "**Aktions-Modus aktiviert**\n\nSie können jetzt Aktionen wie Korrekturbuchungen erstellen und Prüfungen markieren.\n\nDer Modus wird in {} Minuten automatisch deaktiviert.",
                        remaining / 60
                    ),
                    disclaimer: Some(disclaimer::for_context(mode.mode_type, None)),
                    ..Default::default()
                }
            }
            SpecialCommand::DeactivateActionMode => {
                let mode = self.modes.deactivate(user_id).await;

                AgentResponse {
                    success: true,
                    message: "**Aktions-Modus deaktiviert**\n\nSie befinden sich wieder im Erklär-Modus (nur Lesezugriff).".to_string(),
                    disclaimer: Some(disclaimer::for_context(mode.mode_type, None)),
                    ..Default::default()
                }
            }
            SpecialCommand::ModeStatus => {
                let status = self.modes.status(user_id).await;
                let mut message = format!("**Aktueller Modus: {}**\n\n", status.mode_type);

                match (status.mode_type, status.remaining_seconds) {
                    (ModeType::Action, Some(remaining)) => {
                        message.push_str(&format!("Verbleibende Zeit: {} Minuten", remaining / 60));
                    }
                    _ => message.push_str(
                        "Im Erklär-Modus haben Sie nur Lesezugriff. Aktionen erfordern die Aktivierung des Aktions-Modus.",
                    ),
                }

                AgentResponse {
                    success: true,
                    message,
                    ..Default::default()
                }
            }
        }
    }

    fn mode_change_response(&self) -> AgentResponse {
        let prompt = self.modes.activation_prompt();

        AgentResponse {
            success: false,
            message: activation_message(&prompt),
            requires_mode_change: true,
            suggested_action: Some(SuggestedAction {
                action_type: SuggestedActionType::ActivateActionMode,
                label: prompt.title,
                payload: None,
                requires_confirmation: false,
            }),
            ..Default::default()
        }
    }

    /// Answer directly with the model; no reasoning or quality synthesis.
    async fn chat_fallback(&self, text: &str, ctx: &AgentContext) -> AgentResponse {
        let mode = ctx.mode.mode_type;
        let system_prompt = chat_system_prompt(mode);

        match complete_bounded(
            self.completion.as_ref(),
            text,
            Some(system_prompt.as_str()),
            self.config.llm_timeout,
        )
        .await
        {
            Ok(answer) => AgentResponse {
                success: true,
                message: answer,
                provenance: vec![provenance::ai_inference(
                    self.completion.name(),
                    "Antwort basiert auf AI-Analyse",
                )],
                disclaimer: Some(disclaimer::for_context(mode, None)),
                ..Default::default()
            },
            Err(e) => {
                warn!(user_id = %ctx.user_id, "Chat fallback failed: {}", e);
                AgentResponse {
                    success: false,
                    message: CHAT_UNAVAILABLE.to_string(),
                    reasoning: Some(ReasoningChain::empty(CHAT_UNAVAILABLE)),
                    disclaimer: Some(disclaimer::for_context(mode, None)),
                    ..Default::default()
                }
            }
        }
    }

    /// Best-effort audit write; failures are logged and leave the response alone.
    async fn write_audit(
        &self,
        text: &str,
        ctx: &AgentContext,
        request_timestamp: DateTime<Utc>,
        response: &AgentResponse,
        tool_name: &str,
        processing_time_ms: u64,
    ) -> Option<Uuid> {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            context_id: ctx.context_id.clone(),
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            request_text: text.to_string(),
            request_mode: ctx.mode.mode_type,
            request_timestamp,
            response_summary: response
                .message
                .chars()
                .take(self.config.response_summary_chars)
                .collect(),
            success: response.success,
            ai_recommendation: response.suggested_action.as_ref().map(|a| a.label.clone()),
            ai_confidence: response
                .quality
                .as_ref()
                .map(|q| q.confidence_breakdown.overall),
            reasoning_chain: response.reasoning.clone(),
            quality_indicators: response.quality.clone(),
            provenance: response.provenance.clone(),
            tool_name: tool_name.to_string(),
            processing_time_ms,
            integrity_hash: String::new(),
            decision: None,
        };

        match self.audit.record(entry).await {
            Ok(id) => Some(id),
            Err(e) => {
                error!(user_id = %ctx.user_id, tool_name = %tool_name, "Audit write failed: {}", e);
                None
            }
        }
    }

    // ===== Caller surface =====

    /// Attach the user's verdict to an audit entry; `false` on any failure.
    pub async fn record_decision(
        &self,
        audit_log_id: Uuid,
        decision: OverrideDecision,
        reasoning: Option<String>,
        action_taken: Option<String>,
        action_result: Option<Value>,
    ) -> bool {
        match self
            .audit
            .attach_decision(audit_log_id, decision, reasoning, action_taken, action_result)
            .await
        {
            Ok(attached) => attached,
            Err(e) => {
                error!(audit_log_id = %audit_log_id, "Recording decision failed: {}", e);
                false
            }
        }
    }

    pub async fn mode_status(&self, user_id: &str) -> ModeStatus {
        self.modes.status(user_id).await
    }

    pub async fn set_mode(&self, user_id: &str, mode: ModeType) -> AgentMode {
        self.modes.set_mode(user_id, mode).await
    }

    pub fn activation_prompt(&self) -> ActivationPrompt {
        self.modes.activation_prompt()
    }

    pub async fn audit_query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        self.audit.query(filter).await
    }

    pub async fn audit_statistics(&self, range: DateRange) -> Result<AuditStatistics> {
        self.audit.statistics(range).await
    }

    pub async fn overrides(&self, range: DateRange) -> Result<Vec<OverrideRecord>> {
        self.audit.overrides(range).await
    }

    pub async fn verify_audit_entry(&self, audit_log_id: Uuid) -> Result<bool> {
        self.audit.verify_integrity(audit_log_id).await
    }
}

// ===== Response assembly =====

fn activation_message(prompt: &ActivationPrompt) -> String {
    let capabilities: Vec<String> = prompt
        .capabilities
        .iter()
        .map(|c| format!("• {}", c))
        .collect();

    format!(
        "Diese Aktion erfordert den Aktions-Modus.\n\n**{}**\n\n{}\n{}\n\n{}",
        prompt.title,
        prompt.description,
        capabilities.join("\n"),
        prompt.warning
    )
}

fn single_response(result: ToolResult, mode: ModeType) -> AgentResponse {
    let disclaimer = result
        .disclaimer
        .unwrap_or_else(|| disclaimer::for_context(mode, result.quality.as_ref()));
    let provenance = provenance::combine([result.provenance.as_slice()]);

    AgentResponse {
        success: result.success,
        message: result.message,
        reasoning: result.reasoning,
        quality: result.quality,
        provenance,
        suggested_action: result.suggested_action,
        override_options: result.override_options,
        disclaimer: Some(disclaimer),
        data: result.data,
        ..Default::default()
    }
}

fn batch_response(batch: BatchResult, mode: ModeType) -> AgentResponse {
    let qualities: Vec<_> = batch
        .results
        .iter()
        .filter_map(|r| r.quality.clone())
        .collect();
    let quality = (!qualities.is_empty()).then(|| merge_quality(&qualities));

    let provenance = provenance::combine(batch.results.iter().map(|r| r.provenance.as_slice()));

    AgentResponse {
        success: batch.succeeded > 0,
        message: batch.summary.clone(),
        disclaimer: Some(disclaimer::for_context(mode, quality.as_ref())),
        quality,
        provenance,
        batch_result: Some(batch),
        ..Default::default()
    }
}

fn failure_response(message: &str, ctx: &AgentContext) -> AgentResponse {
    AgentResponse {
        success: false,
        message: message.to_string(),
        reasoning: Some(ReasoningChain::empty(message)),
        disclaimer: Some(disclaimer::for_context(ctx.mode.mode_type, None)),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditStore;
    use crate::llm::ScriptedCompletion;
    use crate::models::BatchSupport;
    use crate::reasoning::default_quality;
    use crate::tools::testing::{per_item, CountingTool};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    struct Harness {
        orchestrator: Orchestrator,
        completion: Arc<ScriptedCompletion>,
    }

    fn harness(tool: Option<Arc<CountingTool>>, completion: ScriptedCompletion) -> Harness {
        let config = AgentConfig {
            batch_delay: Duration::ZERO,
            ..AgentConfig::default()
        };

        let mut registry = ToolRegistry::new();
        if let Some(tool) = tool {
            registry.register(tool);
        }

        let completion = Arc::new(completion);
        let orchestrator = Orchestrator::new(
            config.clone(),
            Arc::new(ModeManager::new(config.mode_timeout)),
            registry,
            completion.clone(),
            AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), config.store_timeout),
        );

        Harness {
            orchestrator,
            completion,
        }
    }

    fn around_now() -> DateRange {
        DateRange::new(
            Utc::now() - ChronoDuration::hours(1),
            Utc::now() + ChronoDuration::hours(1),
        )
    }

    async fn audit_entries(orchestrator: &Orchestrator) -> Vec<AuditLogEntry> {
        orchestrator
            .audit_query(&AuditFilter::new(around_now()))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_activate_special_command() {
        let h = harness(None, ScriptedCompletion::always("unused"));

        let response = h
            .orchestrator
            .process("Bitte aktiviere Aktions-Modus", "wp-1", None, None)
            .await;

        assert!(response.success);
        assert!(response.message.contains("30 Minuten"));
        assert!(response.disclaimer.unwrap().contains("Aktions-Modus"));
        assert_eq!(h.orchestrator.mode_status("wp-1").await.mode_type, ModeType::Action);
        assert_eq!(h.completion.call_count().await, 0);
        assert!(response.audit_log_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_and_deactivate_commands() {
        let h = harness(None, ScriptedCompletion::always("unused"));

        let status = h.orchestrator.process("Welcher Modus?", "wp-1", None, None).await;
        assert!(status.message.starts_with("**Aktueller Modus: Erklär-Modus**"));
        assert!(status.message.contains("nur Lesezugriff"));

        h.orchestrator.set_mode("wp-1", ModeType::Action).await;
        let status = h.orchestrator.process("current mode", "wp-1", None, None).await;
        assert!(status.message.contains("Verbleibende Zeit: 30 Minuten"));

        let off = h
            .orchestrator
            .process("deaktiviere aktions-modus", "wp-1", None, None)
            .await;
        assert!(off.success);
        assert!(off.message.contains("Erklär-Modus"));
        assert_eq!(h.orchestrator.mode_status("wp-1").await.mode_type, ModeType::Explain);
    }

    #[tokio::test]
    async fn test_gate_blocks_action_tool_in_explain_mode() {
        let tool = Arc::new(
            CountingTool::new("mark", RequiredMode::Action, BatchSupport::Unsupported)
                .with_triggers(&["markiere"]),
        );
        let h = harness(Some(tool.clone()), ScriptedCompletion::always("{}"));

        let response = h.orchestrator.process("markiere c-1", "wp-1", None, None).await;

        assert!(!response.success);
        assert!(response.requires_mode_change);
        assert!(response.message.starts_with("Diese Aktion erfordert den Aktions-Modus."));
        assert!(response.message.contains("• Prüfungen als erledigt markieren"));
        let action = response.suggested_action.unwrap();
        assert_eq!(action.action_type, SuggestedActionType::ActivateActionMode);
        assert_eq!(action.label, "Aktions-Modus aktivieren");
        assert_eq!(tool.calls(), 0);

        let entries = audit_entries(&h.orchestrator).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tool_name, "mark");
        assert!(!entries[0].success);
    }

    #[tokio::test]
    async fn test_model_claim_of_action_mode_is_gated() {
        let tool = Arc::new(CountingTool::new("look", RequiredMode::Both, BatchSupport::Unsupported));
        let h = harness(
            Some(tool.clone()),
            ScriptedCompletion::always(r#"{"toolName": "look", "params": {"id": "x1"}, "requiresActionMode": true}"#),
        );

        let response = h.orchestrator.process("schau dir x1 an", "wp-1", None, None).await;
        assert!(response.requires_mode_change);
        assert_eq!(tool.calls(), 0);
    }

    #[tokio::test]
    async fn test_action_tool_runs_in_action_mode() {
        let tool = Arc::new(
            CountingTool::new("mark", RequiredMode::Action, BatchSupport::Unsupported)
                .with_triggers(&["markiere"]),
        );
        let h = harness(Some(tool.clone()), ScriptedCompletion::always("{}"));
        h.orchestrator.set_mode("wp-1", ModeType::Action).await;

        let response = h.orchestrator.process("markiere c-1", "wp-1", Some("fs-1"), Some("s-9")).await;

        assert!(response.success);
        assert_eq!(tool.calls(), 1);
        assert!(response.disclaimer.unwrap().contains(disclaimer::ACTION));

        let entry = &audit_entries(&h.orchestrator).await[0];
        assert_eq!(Some(entry.id), response.audit_log_id);
        assert_eq!(entry.session_id, "s-9");
        assert_eq!(entry.context_id.as_deref(), Some("fs-1"));
        assert_eq!(entry.request_mode, ModeType::Action);
    }

    #[tokio::test]
    async fn test_batch_dispatch_and_merge() {
        let tool = Arc::new(
            CountingTool::new("explain", RequiredMode::Both, per_item(10))
                .with_triggers(&["erkläre"]),
        );
        let h = harness(Some(tool.clone()), ScriptedCompletion::always("{}"));

        let response = h
            .orchestrator
            .process("erkläre a1 bad2 a3", "wp-1", None, None)
            .await;

        assert!(response.success);
        assert_eq!(response.message, "2/3 Elemente erfolgreich verarbeitet, 1 fehlgeschlagen.");
        let batch = response.batch_result.unwrap();
        assert_eq!(batch.total, 3);
        assert_eq!(batch.result_index.get(&3).map(String::as_str), Some("a3"));
        // no sub-result carried quality
        assert!(response.quality.is_none());
        assert_eq!(tool.calls(), 3);
    }

    #[tokio::test]
    async fn test_batch_all_failed_is_unsuccessful() {
        let tool = Arc::new(
            CountingTool::new("explain", RequiredMode::Both, per_item(10))
                .with_triggers(&["erkläre"]),
        );
        let h = harness(Some(tool), ScriptedCompletion::always("{}"));

        let response = h.orchestrator.process("erkläre bad1 bad2", "wp-1", None, None).await;
        assert!(!response.success);
        assert_eq!(response.batch_result.unwrap().failed, 2);
    }

    #[tokio::test]
    async fn test_oversized_batch_is_failed_response() {
        let tool = Arc::new(
            CountingTool::new("explain", RequiredMode::Both, per_item(2))
                .with_triggers(&["erkläre"]),
        );
        let h = harness(Some(tool.clone()), ScriptedCompletion::always("{}"));

        let response = h.orchestrator.process("erkläre a1 a2 a3", "wp-1", None, None).await;

        assert!(!response.success);
        assert!(response.message.starts_with("Fehler bei der Verarbeitung:"));
        assert!(response.disclaimer.is_some());
        assert!(response.reasoning.unwrap().steps.is_empty());
        assert_eq!(tool.calls(), 0);
        assert!(response.audit_log_id.is_some());
    }

    #[tokio::test]
    async fn test_tool_error_becomes_failed_response() {
        let tool = Arc::new(
            CountingTool::new("explain", RequiredMode::Both, per_item(5))
                .with_triggers(&["erkläre"]),
        );
        let h = harness(Some(tool), ScriptedCompletion::always("{}"));

        let response = h.orchestrator.process("erkläre err7", "wp-1", None, None).await;
        assert!(!response.success);
        assert!(response.message.contains("exploded on err7"));

        let entries = audit_entries(&h.orchestrator).await;
        assert_eq!(entries[0].tool_name, "explain");
    }

    #[tokio::test]
    async fn test_chat_fallback() {
        let h = harness(None, ScriptedCompletion::always("Nach § 301 HGB ..."));

        let response = h
            .orchestrator
            .process("Was ist die Kapitalkonsolidierung?", "wp-1", None, None)
            .await;

        assert!(response.success);
        assert_eq!(response.message, "Nach § 301 HGB ...");
        assert_eq!(response.provenance.len(), 1);
        assert_eq!(response.provenance[0].source_id, "Scripted AI");
        assert!(response.reasoning.is_none());

        let entries = audit_entries(&h.orchestrator).await;
        assert_eq!(entries[0].tool_name, NONE_TOOL);
    }

    #[tokio::test]
    async fn test_chat_fallback_failure_is_apologetic() {
        let h = harness(None, ScriptedCompletion::failing("quota"));

        let response = h.orchestrator.process("Hallo", "wp-1", None, None).await;
        assert!(!response.success);
        assert_eq!(response.message, CHAT_UNAVAILABLE);
        assert!(response.disclaimer.is_some());
    }

    #[tokio::test]
    async fn test_record_decision() {
        let h = harness(None, ScriptedCompletion::always("Antwort"));
        let response = h.orchestrator.process("Frage", "wp-1", None, None).await;
        let id = response.audit_log_id.unwrap();

        assert!(h.orchestrator.record_decision(id, OverrideDecision::Modify, None, None, None).await);
        assert!(!h.orchestrator.record_decision(id, OverrideDecision::Accept, None, None, None).await);

        let overrides = h.orchestrator.overrides(around_now()).await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].audit_log_id, id);

        let stats = h.orchestrator.audit_statistics(around_now()).await.unwrap();
        assert_eq!(stats.by_decision.modify, 1);
        assert_eq!(stats.missing_reasoning_count, 1);
        assert!(h.orchestrator.verify_audit_entry(id).await.unwrap());
    }

    #[test]
    fn test_single_response_keeps_tool_disclaimer() {
        let mut result = ToolResult::succeeded("ok");
        result.disclaimer = Some("eigener Hinweis".into());
        let response = single_response(result, ModeType::Explain);
        assert_eq!(response.disclaimer.as_deref(), Some("eigener Hinweis"));

        let mut result = ToolResult::succeeded("ok");
        let mut quality = default_quality();
        quality.data_completeness = 50.0;
        result.quality = Some(quality);
        let response = single_response(result, ModeType::Explain);
        assert!(response.disclaimer.unwrap().contains("Nur 50%"));
    }

    #[test]
    fn test_single_response_dedupes_provenance() {
        let mut result = ToolResult::succeeded("ok");
        result.provenance = vec![
            provenance::database_record("consolidation_entries", "e1", None),
            provenance::user_input("wp-1", "Frage"),
            provenance::database_record("consolidation_entries", "e1", Some("doppelt")),
        ];

        let response = single_response(result, ModeType::Explain);
        let sources: Vec<&str> = response
            .provenance
            .iter()
            .map(|p| p.source_id.as_str())
            .collect();
        assert_eq!(sources, vec!["consolidation_entries#e1", "user:wp-1"]);
    }
}

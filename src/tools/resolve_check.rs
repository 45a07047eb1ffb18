//! `resolve_check`: mark a plausibility check as resolved (mutating)

use super::{optional_str, require_str, row_value, Tool};
use crate::models::{
    AgentContext, BatchSupport, ParameterType, RequiredMode, SuggestedAction, SuggestedActionType,
    ToolDescriptor, ToolParameter, ToolResult, CONFIRMED_PARAM,
};
use crate::provenance;
use crate::reasoning::{create_step, ReasoningSynthesizer};
use crate::store::{bounded, RecordStore};
use crate::Result;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const NAME: &str = "resolve_check";

pub const CHECKS_TABLE: &str = "plausibility_checks";

const RESOLVED: &str = "resolved";

pub struct ResolveCheckTool {
    descriptor: ToolDescriptor,
    store: Arc<dyn RecordStore>,
    store_timeout: Duration,
    synthesizer: ReasoningSynthesizer,
}

impl ResolveCheckTool {
    pub fn new(store: Arc<dyn RecordStore>, store_timeout: Duration) -> Self {
        let descriptor = ToolDescriptor {
            name: NAME.to_string(),
            capability_summary: "Markiert eine Plausibilitätsprüfung als erledigt".to_string(),
            parameters: vec![
                ToolParameter {
                    name: "check_id".to_string(),
                    param_type: ParameterType::String,
                    description: "ID der Prüfung".to_string(),
                    required: true,
                },
                ToolParameter {
                    name: "note".to_string(),
                    param_type: ParameterType::String,
                    description: "Begründung für die Erledigung".to_string(),
                    required: false,
                },
                ToolParameter {
                    name: CONFIRMED_PARAM.to_string(),
                    param_type: ParameterType::Boolean,
                    description: "Vom Nutzer bestätigt".to_string(),
                    required: false,
                },
            ],
            required_mode: RequiredMode::Action,
            batch: BatchSupport::Unsupported,
            requires_confirmation: true,
            trigger_phrases: vec![
                "prüfung erledigen".to_string(),
                "markiere prüfung".to_string(),
                "resolve check".to_string(),
            ],
        };

        Self {
            descriptor,
            store,
            store_timeout,
            synthesizer: ReasoningSynthesizer::default(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for ResolveCheckTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: &Value, ctx: &AgentContext) -> Result<ToolResult> {
        let check_id = require_str(params, "check_id")?;
        let note = optional_str(params, "note");

        let check = match bounded(self.store_timeout, self.store.get(CHECKS_TABLE, check_id)).await {
            Ok(Some(check)) => check,
            Ok(None) => {
                return Ok(ToolResult::failed(format!(
                    "Prüfung {} wurde nicht gefunden.",
                    check_id
                )))
            }
            Err(e) => {
                error!(check_id = %check_id, "Check lookup failed: {}", e);
                return Ok(ToolResult::failed(format!(
                    "Prüfung {} konnte nicht geladen werden.",
                    check_id
                )));
            }
        };

        if check.get("status").and_then(Value::as_str) == Some(RESOLVED) {
            return Ok(ToolResult::failed(format!(
                "Prüfung {} ist bereits erledigt.",
                check_id
            )));
        }

        if params.get(CONFIRMED_PARAM).and_then(Value::as_bool) != Some(true) {
            info!(check_id = %check_id, "Resolution awaiting confirmation");
            return Ok(confirmation_request(check_id, note));
        }

        let resolved_at = Utc::now();
        let mut changes = row_value(vec![
            ("status", json!(RESOLVED)),
            ("resolved_by", json!(ctx.user_id)),
            ("resolved_at", json!(resolved_at.to_rfc3339())),
        ]);
        if let Some(note) = note {
            changes.insert("resolution_note".to_string(), json!(note));
        }

        let updated = bounded(
            self.store_timeout,
            self.store.update(CHECKS_TABLE, check_id, changes),
        )
        .await;

        match updated {
            Ok(true) => {}
            Ok(false) => {
                return Ok(ToolResult::failed(format!(
                    "Prüfung {} wurde nicht gefunden.",
                    check_id
                )))
            }
            Err(e) => {
                error!(check_id = %check_id, "Check update failed: {}", e);
                return Ok(ToolResult::failed(format!(
                    "Prüfung {} konnte nicht aktualisiert werden.",
                    check_id
                )));
            }
        }

        info!(check_id = %check_id, user_id = %ctx.user_id, "Check marked as resolved");

        let check_type = check
            .get("check_type")
            .and_then(Value::as_str)
            .unwrap_or("Prüfung");
        let chain = self.synthesizer.build_chain(
            vec![create_step(
                format!("Prüfung {} ({}) war offen", check_id, check_type),
                "Status wurde auf erledigt gesetzt",
                1.0,
                vec![format!("{}#{}", CHECKS_TABLE, check_id)],
            )],
            Some(format!("Prüfung {} ist erledigt.", check_id)),
            None,
        );

        let mut result = ToolResult::succeeded(format!(
            "Prüfung {} wurde als erledigt markiert.",
            check_id
        ));
        result.data = Some(json!({
            "check_id": check_id,
            "status": RESOLVED,
            "resolved_by": ctx.user_id,
            "resolved_at": resolved_at,
        }));
        result.reasoning = Some(chain);
        result.provenance = vec![
            provenance::database_record(CHECKS_TABLE, check_id, Some(check_type)),
            provenance::user_input(&ctx.user_id, note.unwrap_or("Erledigung ohne Notiz")),
        ];
        Ok(result)
    }
}

/// Unconfirmed call: nothing is written, the caller gets the action to confirm.
fn confirmation_request(check_id: &str, note: Option<&str>) -> ToolResult {
    let mut payload = json!({"check_id": check_id, CONFIRMED_PARAM: true});
    if let Some(note) = note {
        payload["note"] = json!(note);
    }

    let mut result = ToolResult::succeeded(format!(
        "Prüfung {} als erledigt markieren? Bitte bestätigen Sie die Änderung.",
        check_id
    ));
    result.data = Some(json!({"check_id": check_id, "pending_confirmation": true}));
    result.provenance = vec![provenance::database_record(CHECKS_TABLE, check_id, None)];
    result.suggested_action = Some(SuggestedAction {
        action_type: SuggestedActionType::MarkResolved,
        label: format!("Prüfung {} als erledigt markieren", check_id),
        payload: Some(payload),
        requires_confirmation: true,
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryRecordStore;
    use crate::tools::testing::context;

    async fn setup() -> (Arc<InMemoryRecordStore>, ResolveCheckTool) {
        let store = Arc::new(InMemoryRecordStore::new());
        store
            .insert(
                CHECKS_TABLE,
                row_value(vec![
                    ("id", json!("chk-1")),
                    ("status", json!("open")),
                    ("check_type", json!("balance")),
                ]),
            )
            .await
            .unwrap();
        let tool = ResolveCheckTool::new(store.clone(), Duration::from_secs(5));
        (store, tool)
    }

    #[tokio::test]
    async fn test_resolves_open_check() {
        let (store, tool) = setup().await;
        let result = tool
            .execute(
                &json!({"check_id": "chk-1", "note": "geklärt", "confirmed": true}),
                &context("wp-1"),
            )
            .await
            .unwrap();

        assert!(result.success);
        let row = store.get(CHECKS_TABLE, "chk-1").await.unwrap().unwrap();
        assert_eq!(row["status"], "resolved");
        assert_eq!(row["resolved_by"], "wp-1");
        assert_eq!(row["resolution_note"], "geklärt");
        assert_eq!(result.provenance.len(), 2);
    }

    #[tokio::test]
    async fn test_unconfirmed_call_does_not_write() {
        let (store, tool) = setup().await;

        for params in [
            json!({"check_id": "chk-1", "note": "geklärt"}),
            json!({"check_id": "chk-1", "confirmed": false}),
            json!({"check_id": "chk-1", "confirmed": "ja"}),
        ] {
            let result = tool.execute(&params, &context("wp-1")).await.unwrap();
            assert!(result.success);
            let action = result.suggested_action.unwrap();
            assert_eq!(action.action_type, SuggestedActionType::MarkResolved);
            assert!(action.requires_confirmation);
            assert_eq!(action.payload.as_ref().unwrap()["check_id"], "chk-1");
            assert_eq!(action.payload.as_ref().unwrap()["confirmed"], true);
        }

        let row = store.get(CHECKS_TABLE, "chk-1").await.unwrap().unwrap();
        assert_eq!(row["status"], "open");
        assert!(row.get("resolved_by").is_none());

        // the suggested payload is what a confirming caller sends back
        let pending = tool
            .execute(&json!({"check_id": "chk-1", "note": "geklärt"}), &context("wp-1"))
            .await
            .unwrap();
        let payload = pending.suggested_action.unwrap().payload.unwrap();
        assert!(tool.execute(&payload, &context("wp-1")).await.unwrap().success);
        let row = store.get(CHECKS_TABLE, "chk-1").await.unwrap().unwrap();
        assert_eq!(row["status"], "resolved");
        assert_eq!(row["resolution_note"], "geklärt");
    }

    #[tokio::test]
    async fn test_already_resolved() {
        let (_store, tool) = setup().await;
        let confirmed = json!({"check_id": "chk-1", "confirmed": true});
        tool.execute(&confirmed, &context("u")).await.unwrap();

        let again = tool
            .execute(&confirmed, &context("u"))
            .await
            .unwrap();
        assert!(!again.success);
        assert!(again.message.contains("bereits erledigt"));
    }

    #[tokio::test]
    async fn test_unknown_check() {
        let (_store, tool) = setup().await;
        let result = tool
            .execute(&json!({"check_id": "missing"}), &context("u"))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_descriptor_requires_action_mode() {
        let tool = ResolveCheckTool::new(Arc::new(InMemoryRecordStore::new()), Duration::from_secs(1));
        assert_eq!(tool.descriptor().required_mode, RequiredMode::Action);
        assert!(tool.descriptor().requires_confirmation);
        assert!(!tool.descriptor().supports_batch());
    }
}

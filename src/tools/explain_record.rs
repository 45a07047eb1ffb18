//! `explain_record`: explain a stored record with reasoning and quality

use super::{optional_str, require_str, standard_override_options, Tool};
use crate::models::{
    AgentContext, BatchSupport, ParameterType, RequiredMode, SuggestedAction,
    SuggestedActionType, ToolDescriptor, ToolParameter, ToolResult,
};
use crate::provenance;
use crate::reasoning::{
    build_quality, create_alternative, create_step, ConfidenceFactors, ReasoningSynthesizer,
};
use crate::store::{bounded, RecordStore, Row};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub const NAME: &str = "explain_record";

const DEFAULT_TABLE: &str = "consolidation_entries";
const MAX_BATCH_SIZE: usize = 50;

/// Fields a record needs for a complete explanation
const EXPECTED_FIELDS: [&str; 4] = ["description", "amount", "entry_type", "period"];

pub struct ExplainRecordTool {
    descriptor: ToolDescriptor,
    store: Arc<dyn RecordStore>,
    store_timeout: Duration,
    synthesizer: ReasoningSynthesizer,
}

impl ExplainRecordTool {
    pub fn new(store: Arc<dyn RecordStore>, store_timeout: Duration, highlight_threshold: f64) -> Self {
        let descriptor = ToolDescriptor {
            name: NAME.to_string(),
            capability_summary: "Erklärt einen gespeicherten Datensatz (z.B. eine Konsolidierungsbuchung) mit Begründung und Qualitätsindikatoren".to_string(),
            parameters: vec![
                ToolParameter {
                    name: "record_id".to_string(),
                    param_type: ParameterType::String,
                    description: "ID des zu erklärenden Datensatzes".to_string(),
                    required: true,
                },
                ToolParameter {
                    name: "table".to_string(),
                    param_type: ParameterType::String,
                    description: "Tabelle des Datensatzes (Standard: consolidation_entries)".to_string(),
                    required: false,
                },
            ],
            required_mode: RequiredMode::Both,
            batch: BatchSupport::PerItem {
                item_param: "record_id".to_string(),
                max_batch_size: MAX_BATCH_SIZE,
            },
            requires_confirmation: false,
            trigger_phrases: vec![
                "erkläre datensatz".to_string(),
                "erkläre buchung".to_string(),
                "erkläre buchungen".to_string(),
                "explain record".to_string(),
            ],
        };

        Self {
            descriptor,
            store,
            store_timeout,
            synthesizer: ReasoningSynthesizer::new(highlight_threshold),
        }
    }

    fn explain(&self, table: &str, record_id: &str, row: &Row) -> ToolResult {
        let missing: Vec<String> = EXPECTED_FIELDS
            .iter()
            .filter(|field| row.get(**field).map(Value::is_null).unwrap_or(true))
            .map(|field| field.to_string())
            .collect();
        let completeness =
            (EXPECTED_FIELDS.len() - missing.len()) as f64 / EXPECTED_FIELDS.len() as f64;

        let description = row
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("ohne Beschreibung");
        let data_ref = format!("{}#{}", table, record_id);

        let mut steps = vec![create_step(
            format!("Datensatz {} geladen: {}", data_ref, description),
            if missing.is_empty() {
                "Alle für die Erklärung benötigten Felder sind vorhanden".to_string()
            } else {
                format!("Es fehlen Angaben: {}", missing.join(", "))
            },
            completeness,
            vec![data_ref.clone()],
        )];

        let mut deviations = Vec::new();
        if let Some(amount) = row.get("amount").and_then(Value::as_f64) {
            let (inference, confidence) = if amount < 0.0 {
                deviations.push(format!("Negativer Betrag {:.2}", amount));
                ("Negativer Betrag deutet auf eine Stornobuchung hin", 0.6)
            } else {
                ("Betrag ist betragsmäßig plausibel", 0.9)
            };
            steps.push(create_step(
                format!("Betrag: {:.2}", amount),
                inference,
                confidence,
                vec![format!("{}.amount", data_ref)],
            ));
        }

        if let Some(entry_type) = row.get("entry_type").and_then(Value::as_str) {
            steps.push(create_step(
                format!("Buchungstyp: {}", entry_type),
                format!("Die Buchung dient der {}", entry_type_purpose(entry_type)),
                0.85,
                vec![format!("{}.entry_type", data_ref)],
            ));
        }

        let mut chain = self.synthesizer.build_chain(steps, None, None);
        if chain.highlight_alternatives {
            chain.alternatives.push(create_alternative(
                "Manuelle Korrekturbuchung ohne Konsolidierungsbezug",
                0.2,
                "Wurde die Buchung manuell erfasst?",
            ));
        }

        let pattern_match = if row.contains_key("entry_type") { 0.8 } else { 0.4 };
        let rule_match = if deviations.is_empty() { 1.0 } else { 0.5 };
        let quality = build_quality(
            completeness * 100.0,
            missing,
            deviations.is_empty(),
            ConfidenceFactors::new(completeness, pattern_match, rule_match),
            deviations,
            None,
        );

        let mut result = ToolResult::succeeded(format!(
            "Erläuterung {}: {}\n\n{}",
            data_ref, description, chain.conclusion
        ));
        result.data = Some(Value::Object(row.clone()));
        result.reasoning = Some(chain);
        result.quality = Some(quality);
        result.provenance = vec![provenance::database_record(table, record_id, Some(description))];
        result.suggested_action = Some(SuggestedAction {
            action_type: SuggestedActionType::ViewDetails,
            label: "Datensatz öffnen".to_string(),
            payload: Some(json!({ "table": table, "id": record_id })),
            requires_confirmation: false,
        });
        result.override_options = standard_override_options();
        result
    }
}

fn entry_type_purpose(entry_type: &str) -> &'static str {
    match entry_type.to_ascii_lowercase().as_str() {
        "capital" | "capital_consolidation" => "Kapitalkonsolidierung",
        "ic_debt" | "debt_consolidation" => "Schuldenkonsolidierung",
        "ic_expense" | "expense_income_elimination" => "Aufwands- und Ertragskonsolidierung",
        "intermediate_result" => "Zwischenergebniseliminierung",
        _ => "Anpassung im Konzernabschluss",
    }
}

#[async_trait::async_trait]
impl Tool for ExplainRecordTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: &Value, _ctx: &AgentContext) -> Result<ToolResult> {
        let record_id = require_str(params, "record_id")?;
        let table = optional_str(params, "table").unwrap_or(DEFAULT_TABLE);

        debug!(table = %table, record_id = %record_id, "Explaining record");

        let row = match bounded(self.store_timeout, self.store.get(table, record_id)).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                return Ok(ToolResult::failed(format!(
                    "Datensatz {} wurde nicht gefunden.",
                    record_id
                )))
            }
            Err(e) => {
                error!(table = %table, record_id = %record_id, "Record lookup failed: {}", e);
                return Ok(ToolResult::failed(format!(
                    "Datensatz {} konnte nicht geladen werden.",
                    record_id
                )));
            }
        };

        Ok(self.explain(table, record_id, &row))
    }
}

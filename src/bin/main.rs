use consolidation_agent_core::{
    agent::Orchestrator,
    audit::{AuditRecorder, DateRange, InMemoryAuditStore},
    config::AgentConfig,
    llm::{CompletionService, GeminiClient, ScriptedCompletion},
    mode::ModeManager,
    models::{AgentResponse, OverrideDecision},
    store::{InMemoryRecordStore, RecordStore},
    tools::{create_default_registry, resolve_check::CHECKS_TABLE},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEMO_USER: &str = "wp-demo";

fn row(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

async fn seed(store: &InMemoryRecordStore) -> consolidation_agent_core::Result<()> {
    store
        .insert(
            "consolidation_entries",
            row(json!({
                "id": "E-100",
                "description": "Eliminierung konzerninterner Forderungen",
                "amount": 125000.0,
                "entry_type": "debt_consolidation",
                "period": "2024",
            })),
        )
        .await?;
    store
        .insert(
            "consolidation_entries",
            row(json!({
                "id": "E-101",
                "description": "Zwischenergebniseliminierung",
                "amount": -4200.0,
                "entry_type": "intermediate_result",
            })),
        )
        .await?;
    store
        .insert(
            CHECKS_TABLE,
            row(json!({"id": "CHK-7", "status": "open", "check_type": "balance"})),
        )
        .await?;
    Ok(())
}

fn print_response(request: &str, response: &AgentResponse) {
    println!("\n=== {} ===", request);
    println!("Success: {}", response.success);
    if response.requires_mode_change {
        println!("Requires mode change");
    }
    println!("{}", response.message);
    if let Some(batch) = &response.batch_result {
        for (position, item) in &batch.result_index {
            if let Some(result) = batch.results.get(position - 1) {
                println!("  {}. {}: {}", position, item, result.message);
            }
        }
    }
    if let Some(disclaimer) = &response.disclaimer {
        println!("---\n{}", disclaimer);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::from_env()?;
    info!("Consolidation agent demo starting");

    let completion: Arc<dyn CompletionService> = match &config.gemini_api_key {
        Some(key) => Arc::new(GeminiClient::new(
            key.clone(),
            config.gemini_model.clone(),
            config.llm_timeout,
        )?),
        None => {
            warn!("GEMINI_API_KEY not set, using scripted completions");
            Arc::new(ScriptedCompletion::always(
                "Die Kapitalkonsolidierung nach § 301 HGB verrechnet den Beteiligungsbuchwert mit dem anteiligen Eigenkapital des Tochterunternehmens.",
            ))
        }
    };

    let store = Arc::new(InMemoryRecordStore::new());
    seed(&store).await?;

    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(ModeManager::new(config.mode_timeout)),
        create_default_registry(store, &config),
        completion,
        AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), config.store_timeout),
    );

    let session = uuid::Uuid::new_v4().to_string();
    let requests = [
        "Welcher Modus ist aktiv?",
        "Prüfung erledigen CHK-7",
        "Aktiviere Aktions-Modus",
        "Prüfung erledigen CHK-7",
        "Prüfung erledigen CHK-7 bestätigt",
        "Erkläre Buchungen E-100, E-101 und E-999",
        "Was regelt § 301 HGB?",
        "Deaktiviere Aktions-Modus",
    ];

    let mut first_audit_id = None;
    for request in requests {
        let response = orchestrator
            .process(request, DEMO_USER, Some("fs-2024"), Some(&session))
            .await;
        print_response(request, &response);
        first_audit_id = first_audit_id.or(response.audit_log_id);
    }

    if let Some(id) = first_audit_id {
        orchestrator
            .record_decision(
                id,
                OverrideDecision::Reject,
                Some("Prüfung wird manuell geklärt".to_string()),
                None,
                None,
            )
            .await;
    }

    let stats = orchestrator
        .audit_statistics(DateRange::last(chrono::Duration::hours(1)))
        .await?;

    println!("\n=== AUDIT STATISTICS ===");
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}

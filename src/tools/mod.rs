//! Tool trait, registry and dispatch
//!
//! A tool is described once at startup by an immutable [`ToolDescriptor`].
//! The registry performs no authorization; the orchestrator checks
//! `required_mode` before dispatching.

use crate::config::AgentConfig;
use crate::error::OrchestrationError;
use crate::models::{
    AgentContext, BatchResult, BatchSupport, OverrideOption, ToolDescriptor, ToolResult,
};
use crate::store::RecordStore;
use crate::Result;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod explain_record;
pub mod resolve_check;

pub use explain_record::ExplainRecordTool;
pub use resolve_check::ResolveCheckTool;

/// A pluggable operation the orchestrator may invoke
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Run on a single item. A missing domain entity is a failed
    /// `ToolResult`, not an `Err`.
    async fn execute(&self, params: &Value, ctx: &AgentContext) -> Result<ToolResult>;
}

/// Name → tool mapping, filled at startup and read-only afterwards
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. A duplicate name replaces the earlier tool; the
    /// replaced descriptor is returned.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Option<ToolDescriptor> {
        let name = tool.descriptor().name.clone();
        let previous = self
            .tools
            .insert(name.clone(), tool)
            .map(|old| old.descriptor().clone());

        if previous.is_some() {
            warn!(tool_name = %name, "Tool registered twice, last registration wins");
        } else {
            debug!(tool_name = %name, "Tool registered");
        }

        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name).map(|tool| tool.descriptor())
    }

    /// All descriptors, sorted by name
    pub fn all(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<_> = self.tools.values().map(|t| t.descriptor()).collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ===== Batch dispatch =====

/// Run `tool` once per item, sequentially, pausing `delay` between items.
///
/// Each item is passed under the descriptor's `item_param`, merged over
/// `base_params`. Item failures (failed results or errors) are counted,
/// never propagated. Oversized batches are rejected before any call.
pub async fn execute_batch(
    tool: &dyn Tool,
    items: &[String],
    base_params: &Value,
    ctx: &AgentContext,
    delay: Duration,
) -> Result<BatchResult> {
    let descriptor = tool.descriptor();

    let BatchSupport::PerItem {
        item_param,
        max_batch_size,
    } = &descriptor.batch
    else {
        return Err(OrchestrationError::InvalidToolInput(format!(
            "Tool {} does not support batch processing",
            descriptor.name
        )));
    };

    if items.len() > *max_batch_size {
        return Err(OrchestrationError::BatchTooLarge {
            tool: descriptor.name.clone(),
            size: items.len(),
            max: *max_batch_size,
        });
    }

    info!(
        tool_name = %descriptor.name,
        items = items.len(),
        session_id = %ctx.session_id,
        "Starting batch"
    );

    let mut results = Vec::with_capacity(items.len());
    let mut result_index = BTreeMap::new();
    let mut succeeded = 0;
    let mut failed = 0;

    for (i, item) in items.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let params = item_params(base_params, item_param, item);
        let result = match tool.execute(&params, ctx).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool_name = %descriptor.name, item = %item, "Batch item failed: {}", e);
                ToolResult::failed(format!("Verarbeitung fehlgeschlagen: {}", e))
            }
        };

        if result.success {
            succeeded += 1;
        } else {
            failed += 1;
        }

        result_index.insert(i + 1, item.clone());
        results.push(result);
    }

    let total = items.len();
    info!(tool_name = %descriptor.name, succeeded, failed, "Batch finished");

    Ok(BatchResult {
        total,
        processed: results.len(),
        succeeded,
        failed,
        summary: batch_summary(succeeded, failed, total),
        results,
        session_id: ctx.session_id.clone(),
        result_index,
    })
}

fn item_params(base: &Value, item_param: &str, item: &str) -> Value {
    let mut params = base.as_object().cloned().unwrap_or_default();
    params.insert(item_param.to_string(), Value::String(item.to_string()));
    Value::Object(params)
}

pub fn batch_summary(succeeded: usize, failed: usize, total: usize) -> String {
    if failed == 0 {
        format!("{}/{} Elemente erfolgreich verarbeitet.", succeeded, total)
    } else {
        format!(
            "{}/{} Elemente erfolgreich verarbeitet, {} fehlgeschlagen.",
            succeeded, total, failed
        )
    }
}

// ===== Shared helpers for tool implementations =====

/// Accept / reject / modify options offered with a recommendation
pub fn standard_override_options() -> Vec<OverrideOption> {
    vec![
        OverrideOption {
            id: "accept".to_string(),
            label: "Empfehlung übernehmen".to_string(),
            requires_reasoning: false,
        },
        OverrideOption {
            id: "reject".to_string(),
            label: "Empfehlung ablehnen".to_string(),
            requires_reasoning: true,
        },
        OverrideOption {
            id: "modify".to_string(),
            label: "Empfehlung anpassen".to_string(),
            requires_reasoning: true,
        },
    ]
}

pub(crate) fn require_str<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OrchestrationError::InvalidToolInput(format!("Expected '{}' in tool params", name))
        })
}

pub(crate) fn optional_str<'a>(params: &'a Value, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

pub(crate) fn row_value(changes: Vec<(&str, Value)>) -> Map<String, Value> {
    changes
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

/// Registry with the built-in record tools.
pub fn create_default_registry(store: Arc<dyn RecordStore>, config: &AgentConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(ExplainRecordTool::new(
        Arc::clone(&store),
        config.store_timeout,
        config.highlight_threshold,
    )));
    registry.register(Arc::new(ResolveCheckTool::new(store, config.store_timeout)));

    registry
}

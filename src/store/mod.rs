//! Record store collaborator
//!
//! Row-oriented CRUD used by tools. The production implementation lives
//! outside this crate; the in-memory store backs development and tests.

use crate::error::OrchestrationError;
use crate::Result;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

pub type Row = Map<String, Value>;

/// Equality filters, optional ordering, optional limit
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<String>,
    pub ascending: bool,
    pub limit: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self {
            ascending: true,
            ..Default::default()
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order_by = Some(column.to_string());
        self.ascending = ascending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, row: &Row) -> bool {
        self.filters
            .iter()
            .all(|(column, expected)| row.get(column) == Some(expected))
    }
}

#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>>;
    async fn query(&self, table: &str, query: &RecordQuery) -> Result<Vec<Row>>;
    /// Insert a row; returns its id (taken from `row["id"]` or generated).
    async fn insert(&self, table: &str, row: Row) -> Result<String>;
    /// Merge `changes` into an existing row; `false` when the row does not exist.
    async fn update(&self, table: &str, id: &str, changes: Row) -> Result<bool>;
}

/// Await a store call, failing with `StoreTimeout` instead of hanging.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(OrchestrationError::StoreTimeout(timeout.as_secs())),
    }
}

/// In-memory record store for development
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<HashMap<String, BTreeMap<String, Row>>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, table: &str, id: &str) -> Result<Option<Row>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|rows| rows.get(id)).cloned())
    }

    async fn query(&self, table: &str, query: &RecordQuery) -> Result<Vec<Row>> {
        let tables = self.tables.read().await;

        let mut rows: Vec<Row> = tables
            .get(table)
            .map(|rows| rows.values().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();

        if let Some(column) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                if query.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<String> {
        let id = match row.get("id") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(other) if !other.is_null() => {
                return Err(OrchestrationError::StoreError(format!(
                    "Row id must be a string, got {}",
                    other
                )))
            }
            _ => Uuid::new_v4().to_string(),
        };
        row.insert("id".to_string(), Value::String(id.clone()));

        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(id.clone(), row);

        Ok(id)
    }

    async fn update(&self, table: &str, id: &str, changes: Row) -> Result<bool> {
        let mut tables = self.tables.write().await;

        let Some(row) = tables.get_mut(table).and_then(|rows| rows.get_mut(id)) else {
            return Ok(false);
        };

        for (column, value) in changes {
            if column != "id" {
                row.insert(column, value);
            }
        }

        Ok(true)
    }
}

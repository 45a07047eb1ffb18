//! Audit recording for regulatory review
//!
//! One entry per processed request, sealed with a SHA-256 hash over its
//! request/response fields. The only later change is the user's decision.

use crate::error::OrchestrationError;
use crate::models::{
    AuditLogEntry, ModeType, OverrideDecision, OverrideRecord, ProvenanceInfo, QualityIndicators,
    ReasoningChain, UserDecision,
};
use crate::store::bounded;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod stats;
pub mod store;

pub use stats::{AuditStatistics, DecisionCounts, UserStatistics};
pub use store::{AuditStore, InMemoryAuditStore};

/// Override reasoning recorded when the user gave none
pub const NO_REASONING_GIVEN: &str = "Keine Begründung angegeben";

/// Inclusive time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// From `span` ago until now
    pub fn last(span: chrono::Duration) -> Self {
        let end = Utc::now();
        Self {
            start: end - span,
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub range: DateRange,
    pub user_id: Option<String>,
    pub decision: Option<OverrideDecision>,
    pub tool_name: Option<String>,
}

impl AuditFilter {
    pub fn new(range: DateRange) -> Self {
        Self {
            range,
            user_id: None,
            decision: None,
            tool_name: None,
        }
    }

    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn decision(mut self, decision: OverrideDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn tool(mut self, tool_name: &str) -> Self {
        self.tool_name = Some(tool_name.to_string());
        self
    }

    fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.user_id.as_deref().map_or(true, |u| entry.user_id == u)
            && self.tool_name.as_deref().map_or(true, |t| entry.tool_name == t)
            && self
                .decision
                .map_or(true, |d| entry.decision.as_ref().map(|ud| ud.decision) == Some(d))
    }
}

/// Append-only audit recorder over an [`AuditStore`]
pub struct AuditRecorder {
    store: Arc<dyn AuditStore>,
    timeout: Duration,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn AuditStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Seal and store an entry; returns its id.
    pub async fn record(&self, mut entry: AuditLogEntry) -> Result<Uuid> {
        entry.integrity_hash = compute_integrity_hash(&entry);
        let tool_name = entry.tool_name.clone();

        let id = bounded(self.timeout, self.store.insert_entry(entry)).await?;

        info!(audit_log_id = %id, tool_name = %tool_name, "Audit entry recorded");
        Ok(id)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<AuditLogEntry>> {
        bounded(self.timeout, self.store.get_entry(id)).await
    }

    /// Attach the user's verdict to an open entry.
    ///
    /// Reject and modify also create an override record, written together
    /// with the decision. Returns `false` when the entry does not exist or
    /// was already decided.
    pub async fn attach_decision(
        &self,
        id: Uuid,
        decision: OverrideDecision,
        reasoning: Option<String>,
        action_taken: Option<String>,
        action_result: Option<Value>,
    ) -> Result<bool> {
        let Some(entry) = self.get(id).await? else {
            warn!(audit_log_id = %id, "Decision for unknown audit entry");
            return Ok(false);
        };

        if !entry.is_open() {
            warn!(audit_log_id = %id, "Audit entry already decided");
            return Ok(false);
        }

        let reasoning = reasoning.filter(|r| !r.trim().is_empty());
        let user_decision = UserDecision {
            decision,
            reasoning: reasoning.clone(),
            decided_at: Utc::now(),
            action_taken: action_taken.clone(),
            action_result,
        };

        let override_record = decision.is_override().then(|| OverrideRecord {
            id: Uuid::new_v4(),
            audit_log_id: id,
            original_recommendation: entry.ai_recommendation.clone(),
            ai_confidence: entry.ai_confidence,
            wp_decision: decision,
            wp_reasoning: reasoning.unwrap_or_else(|| NO_REASONING_GIVEN.to_string()),
            wp_alternative: action_taken,
            wp_user_id: entry.user_id.clone(),
            timestamp: Utc::now(),
            data_points_considered: entry
                .provenance
                .iter()
                .map(|p| p.source_id.clone())
                .collect(),
        });
        let overridden = override_record.is_some();

        if !bounded(
            self.timeout,
            self.store.decide(id, user_decision, override_record),
        )
        .await?
        {
            return Ok(false);
        }

        info!(audit_log_id = %id, decision = ?decision, "User decision attached");
        if overridden {
            debug!(audit_log_id = %id, "Override recorded");
        }

        Ok(true)
    }

    /// Matching entries, newest first
    pub async fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditLogEntry>> {
        let mut entries: Vec<_> = bounded(
            self.timeout,
            self.store.entries_between(filter.range.start, filter.range.end),
        )
        .await?
        .into_iter()
        .filter(|e| filter.matches(e))
        .collect();

        entries.sort_by(|a, b| b.request_timestamp.cmp(&a.request_timestamp));
        Ok(entries)
    }

    /// Override records in the window, newest first
    pub async fn overrides(&self, range: DateRange) -> Result<Vec<OverrideRecord>> {
        let mut overrides =
            bounded(self.timeout, self.store.overrides_between(range.start, range.end)).await?;
        overrides.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(overrides)
    }

    pub async fn statistics(&self, range: DateRange) -> Result<AuditStatistics> {
        let entries =
            bounded(self.timeout, self.store.entries_between(range.start, range.end)).await?;
        let overrides =
            bounded(self.timeout, self.store.overrides_between(range.start, range.end)).await?;

        Ok(stats::compute(range, &entries, &overrides))
    }

    /// Recompute the hash of a stored entry and compare.
    pub async fn verify_integrity(&self, id: Uuid) -> Result<bool> {
        let entry = self
            .get(id)
            .await?
            .ok_or_else(|| OrchestrationError::NotFound(format!("audit entry {}", id)))?;

        Ok(compute_integrity_hash(&entry) == entry.integrity_hash)
    }
}

/// Fields covered by the integrity hash; the decision is excluded.
#[derive(Serialize)]
struct SealedFields<'a> {
    id: &'a Uuid,
    context_id: &'a Option<String>,
    user_id: &'a str,
    session_id: &'a str,
    request_text: &'a str,
    request_mode: ModeType,
    request_timestamp: &'a DateTime<Utc>,
    response_summary: &'a str,
    success: bool,
    ai_recommendation: &'a Option<String>,
    ai_confidence: Option<f64>,
    reasoning_chain: &'a Option<ReasoningChain>,
    quality_indicators: &'a Option<QualityIndicators>,
    provenance: &'a [ProvenanceInfo],
    tool_name: &'a str,
    processing_time_ms: u64,
}

/// SHA-256 hex digest of the sealed fields, streamed into the hasher
pub fn compute_integrity_hash(entry: &AuditLogEntry) -> String {
    let sealed = SealedFields {
        id: &entry.id,
        context_id: &entry.context_id,
        user_id: &entry.user_id,
        session_id: &entry.session_id,
        request_text: &entry.request_text,
        request_mode: entry.request_mode,
        request_timestamp: &entry.request_timestamp,
        response_summary: &entry.response_summary,
        success: entry.success,
        ai_recommendation: &entry.ai_recommendation,
        ai_confidence: entry.ai_confidence,
        reasoning_chain: &entry.reasoning_chain,
        quality_indicators: &entry.quality_indicators,
        provenance: &entry.provenance,
        tool_name: &entry.tool_name,
        processing_time_ms: entry.processing_time_ms,
    };

    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &sealed).is_err() {
        return String::new();
    }

    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UNKNOWN_TOOL;
    use crate::provenance;
    use chrono::Duration as ChronoDuration;
    use tokio_test::{assert_err, assert_ok};

    fn entry(user_id: &str, tool_name: &str, confidence: Option<f64>, at: DateTime<Utc>) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            context_id: Some("fs-2025".to_string()),
            user_id: user_id.to_string(),
            session_id: "s1".to_string(),
            request_text: "Erkläre Buchung e1".to_string(),
            request_mode: ModeType::Explain,
            request_timestamp: at,
            response_summary: "Erläuterung".to_string(),
            success: true,
            ai_recommendation: Some("Datensatz öffnen".to_string()),
            ai_confidence: confidence,
            reasoning_chain: None,
            quality_indicators: None,
            provenance: vec![provenance::database_record("consolidation_entries", "e1", None)],
            tool_name: tool_name.to_string(),
            processing_time_ms: 12,
            integrity_hash: String::new(),
            decision: None,
        }
    }

    fn recorder() -> AuditRecorder {
        AuditRecorder::new(Arc::new(InMemoryAuditStore::new()), Duration::from_secs(5))
    }

    fn around_now() -> DateRange {
        DateRange::new(Utc::now() - ChronoDuration::hours(1), Utc::now() + ChronoDuration::hours(1))
    }

    #[tokio::test]
    async fn test_record_query_round_trip() {
        let recorder = recorder();
        let original = entry("wp-1", "explain_record", Some(0.9), Utc::now());
        let id = assert_ok!(recorder.record(original.clone()).await);

        let found = recorder.query(&AuditFilter::new(around_now())).await.unwrap();
        assert_eq!(found.len(), 1);
        let stored = &found[0];
        assert_eq!(stored.id, id);
        assert_eq!(stored.request_text, original.request_text);
        assert_eq!(stored.response_summary, original.response_summary);
        assert_eq!(stored.request_timestamp, original.request_timestamp);
        assert_eq!(stored.ai_confidence, original.ai_confidence);
        assert!(stored.is_open());
        assert_eq!(stored.integrity_hash.len(), 64);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let recorder = recorder();
        let e = entry("wp-1", "t", None, Utc::now());
        recorder.record(e.clone()).await.unwrap();
        assert_err!(recorder.record(e).await);
    }

    #[tokio::test]
    async fn test_reject_creates_override_with_sentinel() {
        let recorder = recorder();
        let id = recorder
            .record(entry("wp-1", "explain_record", Some(0.5), Utc::now()))
            .await
            .unwrap();

        assert!(recorder
            .attach_decision(id, OverrideDecision::Reject, Some("   ".into()), None, None)
            .await
            .unwrap());

        let decided = recorder
            .query(&AuditFilter::new(around_now()).decision(OverrideDecision::Reject))
            .await
            .unwrap();
        assert_eq!(decided.len(), 1);
        let decision = decided[0].decision.as_ref().unwrap();
        assert_eq!(decision.decision, OverrideDecision::Reject);
        assert!(decision.reasoning.is_none());

        let overrides = recorder.overrides(around_now()).await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].audit_log_id, id);
        assert_eq!(overrides[0].wp_reasoning, NO_REASONING_GIVEN);
        assert_eq!(overrides[0].wp_user_id, "wp-1");
        assert_eq!(overrides[0].original_recommendation.as_deref(), Some("Datensatz öffnen"));
        assert_eq!(overrides[0].data_points_considered, vec!["consolidation_entries#e1"]);
    }

    #[tokio::test]
    async fn test_modify_keeps_reasoning_and_alternative() {
        let recorder = recorder();
        let id = recorder.record(entry("wp-1", "t", None, Utc::now())).await.unwrap();

        recorder
            .attach_decision(
                id,
                OverrideDecision::Modify,
                Some("Betrag anders zu würdigen".into()),
                Some("Korrekturbuchung 500".into()),
                None,
            )
            .await
            .unwrap();

        let overrides = recorder.overrides(around_now()).await.unwrap();
        assert_eq!(overrides[0].wp_reasoning, "Betrag anders zu würdigen");
        assert_eq!(overrides[0].wp_alternative.as_deref(), Some("Korrekturbuchung 500"));
    }

    #[tokio::test]
    async fn test_accept_has_no_override_and_decides_once() {
        let recorder = recorder();
        let id = recorder.record(entry("wp-1", "t", None, Utc::now())).await.unwrap();

        assert!(recorder
            .attach_decision(id, OverrideDecision::Accept, None, None, None)
            .await
            .unwrap());
        assert!(recorder.overrides(around_now()).await.unwrap().is_empty());

        // second verdict is refused
        assert!(!recorder
            .attach_decision(id, OverrideDecision::Reject, None, None, None)
            .await
            .unwrap());
        assert!(!recorder
            .attach_decision(Uuid::new_v4(), OverrideDecision::Accept, None, None, None)
            .await
            .unwrap());
    }

    /// Fails the first `decide` call, then delegates
    struct FlakyAuditStore {
        inner: InMemoryAuditStore,
        fail_next: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl AuditStore for FlakyAuditStore {
        async fn insert_entry(&self, entry: AuditLogEntry) -> Result<Uuid> {
            self.inner.insert_entry(entry).await
        }

        async fn get_entry(&self, id: Uuid) -> Result<Option<AuditLogEntry>> {
            self.inner.get_entry(id).await
        }

        async fn decide(
            &self,
            id: Uuid,
            decision: UserDecision,
            override_record: Option<OverrideRecord>,
        ) -> Result<bool> {
            use std::sync::atomic::Ordering;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(OrchestrationError::StoreError("write failed".into()));
            }
            self.inner.decide(id, decision, override_record).await
        }

        async fn entries_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<AuditLogEntry>> {
            self.inner.entries_between(start, end).await
        }

        async fn overrides_between(
            &self,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<OverrideRecord>> {
            self.inner.overrides_between(start, end).await
        }
    }

    #[tokio::test]
    async fn test_failed_decision_write_leaves_entry_open() {
        let recorder = AuditRecorder::new(
            Arc::new(FlakyAuditStore {
                inner: InMemoryAuditStore::new(),
                fail_next: std::sync::atomic::AtomicBool::new(true),
            }),
            Duration::from_secs(5),
        );
        let id = recorder.record(entry("wp-1", "t", Some(0.4), Utc::now())).await.unwrap();

        assert_err!(
            recorder
                .attach_decision(id, OverrideDecision::Reject, Some("falsch".into()), None, None)
                .await
        );
        assert!(recorder.get(id).await.unwrap().unwrap().is_open());
        assert!(recorder.overrides(around_now()).await.unwrap().is_empty());

        // retry goes through and writes both
        assert!(recorder
            .attach_decision(id, OverrideDecision::Reject, Some("falsch".into()), None, None)
            .await
            .unwrap());
        let stored = recorder.get(id).await.unwrap().unwrap();
        assert_eq!(stored.decision.map(|d| d.decision), Some(OverrideDecision::Reject));
        let overrides = recorder.overrides(around_now()).await.unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides[0].wp_reasoning, "falsch");
    }

    #[tokio::test]
    async fn test_query_filters_and_order() {
        let recorder = recorder();
        let now = Utc::now();
        recorder.record(entry("a", "explain_record", None, now - ChronoDuration::minutes(10))).await.unwrap();
        recorder.record(entry("a", "resolve_check", None, now - ChronoDuration::minutes(5))).await.unwrap();
        recorder.record(entry("b", "explain_record", None, now)).await.unwrap();
        recorder.record(entry("a", "explain_record", None, now - ChronoDuration::days(3))).await.unwrap();

        let all = recorder.query(&AuditFilter::new(around_now())).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].request_timestamp >= w[1].request_timestamp));

        let user_a = recorder
            .query(&AuditFilter::new(around_now()).user("a").tool("explain_record"))
            .await
            .unwrap();
        assert_eq!(user_a.len(), 1);
    }

    #[tokio::test]
    async fn test_integrity_survives_decision_but_not_tampering() {
        let store = Arc::new(InMemoryAuditStore::new());
        let recorder = AuditRecorder::new(store.clone(), Duration::from_secs(5));
        let id = recorder.record(entry("wp-1", "t", Some(0.7), Utc::now())).await.unwrap();

        assert!(recorder.verify_integrity(id).await.unwrap());

        recorder
            .attach_decision(id, OverrideDecision::Accept, None, None, None)
            .await
            .unwrap();
        assert!(recorder.verify_integrity(id).await.unwrap());

        let mut tampered = store.get_entry(id).await.unwrap().unwrap();
        tampered.id = Uuid::new_v4();
        tampered.response_summary = "geändert".to_string();
        let tampered_id = store.insert_entry(tampered).await.unwrap();
        assert!(!recorder.verify_integrity(tampered_id).await.unwrap());

        assert!(matches!(
            recorder.verify_integrity(Uuid::new_v4()).await,
            Err(OrchestrationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_statistics() {
        let recorder = recorder();
        let now = Utc::now();

        let a1 = recorder.record(entry("a", "explain_record", Some(0.9), now)).await.unwrap();
        let a2 = recorder.record(entry("a", "explain_record", Some(0.5), now)).await.unwrap();
        let b1 = recorder.record(entry("b", "resolve_check", Some(0.7), now)).await.unwrap();
        recorder.record(entry("b", UNKNOWN_TOOL, None, now)).await.unwrap();

        recorder.attach_decision(a1, OverrideDecision::Accept, None, None, None).await.unwrap();
        recorder.attach_decision(a2, OverrideDecision::Reject, None, None, None).await.unwrap();
        recorder
            .attach_decision(b1, OverrideDecision::Modify, Some("anders".into()), None, None)
            .await
            .unwrap();

        let stats = recorder.statistics(around_now()).await.unwrap();

        assert_eq!(stats.total_interactions, 4);
        assert_eq!(
            stats.by_decision,
            DecisionCounts { accept: 1, reject: 1, modify: 1, ignore: 1 }
        );
        assert_eq!(stats.by_tool["explain_record"], 2);
        assert_eq!(stats.by_tool[UNKNOWN_TOOL], 1);
        assert_eq!(stats.by_user[0].user_id, "a");
        assert_eq!(stats.by_user[0].accept_rate, 0.5);
        assert_eq!(stats.by_user[1].accept_rate, 0.0);
        assert!((stats.average_confidence - 0.7).abs() < 1e-9);
        assert_eq!(stats.override_rate, 0.5);
        assert_eq!(stats.low_confidence_interactions, 1);
        assert_eq!(stats.missing_reasoning_count, 1);
    }

    #[tokio::test]
    async fn test_statistics_empty_window() {
        let recorder = recorder();
        let range = DateRange::last(ChronoDuration::days(1));
        let stats = recorder.statistics(range).await.unwrap();
        assert_eq!(stats, AuditStatistics::empty(range));
    }

    #[test]
    fn test_hash_excludes_decision() {
        let mut e = entry("wp-1", "t", None, Utc::now());
        let before = compute_integrity_hash(&e);
        e.decision = Some(UserDecision {
            decision: OverrideDecision::Accept,
            reasoning: None,
            decided_at: Utc::now(),
            action_taken: None,
            action_result: None,
        });
        assert_eq!(compute_integrity_hash(&e), before);

        e.request_text.push('!');
        assert_ne!(compute_integrity_hash(&e), before);
    }
}

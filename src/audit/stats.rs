//! Audit statistics over a date window (full scan, no counters)

use super::{DateRange, NO_REASONING_GIVEN};
use crate::models::{AuditLogEntry, ConfidenceLevel, OverrideDecision, OverrideRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub accept: usize,
    pub reject: usize,
    pub modify: usize,
    /// Explicit ignores plus entries that were never decided
    pub ignore: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: String,
    pub interactions: usize,
    pub accept_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub period: DateRange,
    pub total_interactions: usize,
    pub by_decision: DecisionCounts,
    pub by_tool: BTreeMap<String, usize>,
    /// Sorted by user id
    pub by_user: Vec<UserStatistics>,
    pub average_confidence: f64,
    pub override_rate: f64,
    pub low_confidence_interactions: usize,
    pub missing_reasoning_count: usize,
}

impl AuditStatistics {
    pub fn empty(period: DateRange) -> Self {
        Self {
            period,
            total_interactions: 0,
            by_decision: DecisionCounts::default(),
            by_tool: BTreeMap::new(),
            by_user: Vec::new(),
            average_confidence: 0.0,
            override_rate: 0.0,
            low_confidence_interactions: 0,
            missing_reasoning_count: 0,
        }
    }
}

pub fn compute(
    period: DateRange,
    entries: &[AuditLogEntry],
    overrides: &[OverrideRecord],
) -> AuditStatistics {
    let mut stats = AuditStatistics::empty(period);
    stats.total_interactions = entries.len();

    let mut users: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    let mut confidence_sum = 0.0;
    let mut confidence_count = 0usize;

    for entry in entries {
        let decision = entry.decision.as_ref().map(|d| d.decision);
        match decision {
            Some(OverrideDecision::Accept) => stats.by_decision.accept += 1,
            Some(OverrideDecision::Reject) => stats.by_decision.reject += 1,
            Some(OverrideDecision::Modify) => stats.by_decision.modify += 1,
            Some(OverrideDecision::Ignore) | None => stats.by_decision.ignore += 1,
        }

        if !entry.tool_name.is_empty() {
            *stats.by_tool.entry(entry.tool_name.clone()).or_insert(0) += 1;
        }

        let user = users.entry(entry.user_id.as_str()).or_insert((0, 0));
        user.0 += 1;
        if decision == Some(OverrideDecision::Accept) {
            user.1 += 1;
        }

        if let Some(confidence) = entry.ai_confidence {
            confidence_sum += confidence;
            confidence_count += 1;
            if ConfidenceLevel::from_score(confidence) == ConfidenceLevel::Low {
                stats.low_confidence_interactions += 1;
            }
        }
    }

    stats.by_user = users
        .into_iter()
        .map(|(user_id, (interactions, accepts))| UserStatistics {
            user_id: user_id.to_string(),
            interactions,
            accept_rate: ratio(accepts, interactions),
        })
        .collect();

    stats.average_confidence = if confidence_count > 0 {
        confidence_sum / confidence_count as f64
    } else {
        0.0
    };

    stats.override_rate = ratio(
        stats.by_decision.reject + stats.by_decision.modify,
        stats.total_interactions,
    );

    stats.missing_reasoning_count = overrides
        .iter()
        .filter(|o| {
            let reasoning = o.wp_reasoning.trim();
            reasoning.is_empty() || reasoning == NO_REASONING_GIVEN
        })
        .count();

    stats
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

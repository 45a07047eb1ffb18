//! Provenance tags (data lineage) attached to results

use crate::models::{ProvenanceInfo, ProvenanceKind};
use chrono::Utc;
use std::collections::HashSet;

fn tag(kind: ProvenanceKind, source_id: String, description: String) -> ProvenanceInfo {
    ProvenanceInfo {
        kind,
        source_id,
        description,
        timestamp: Utc::now(),
    }
}

/// A row in the record store, tagged as `table#id`.
pub fn database_record(table: &str, record_id: &str, description: Option<&str>) -> ProvenanceInfo {
    tag(
        ProvenanceKind::DatabaseRecord,
        format!("{}#{}", table, record_id),
        description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Datensatz aus {}", table)),
    )
}

/// A regulation or rule reference
pub fn rule_reference(reference: &str, description: Option<&str>) -> ProvenanceInfo {
    tag(
        ProvenanceKind::RuleReference,
        reference.to_string(),
        description
            .map(str::to_string)
            .unwrap_or_else(|| format!("Referenz: {}", reference)),
    )
}

pub fn calculation(calculation_type: &str, description: &str, source_record_ids: &[String]) -> ProvenanceInfo {
    let source_id = if source_record_ids.is_empty() {
        calculation_type.to_string()
    } else {
        format!("{}:{}", calculation_type, source_record_ids.join(","))
    };
    tag(ProvenanceKind::Calculation, source_id, description.to_string())
}

pub fn ai_inference(model: &str, description: &str) -> ProvenanceInfo {
    tag(ProvenanceKind::AiInference, model.to_string(), description.to_string())
}

pub fn user_input(user_id: &str, description: &str) -> ProvenanceInfo {
    tag(
        ProvenanceKind::UserInput,
        format!("user:{}", user_id),
        description.to_string(),
    )
}

/// Concatenate provenance lists, keeping the first tag per `(kind, source_id)`.
pub fn combine<'a, I>(lists: I) -> Vec<ProvenanceInfo>
where
    I: IntoIterator<Item = &'a [ProvenanceInfo]>,
{
    let mut seen: HashSet<(ProvenanceKind, String)> = HashSet::new();
    let mut combined = Vec::new();

    for item in lists.into_iter().flatten() {
        if seen.insert((item.kind, item.source_id.clone())) {
            combined.push(item.clone());
        }
    }

    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let db = database_record("checks", "c1", None);
        assert_eq!(db.kind, ProvenanceKind::DatabaseRecord);
        assert_eq!(db.source_id, "checks#c1");
        assert_eq!(db.description, "Datensatz aus checks");

        let rule = rule_reference("§ 303 HGB", None);
        assert_eq!(rule.description, "Referenz: § 303 HGB");

        let calc = calculation("saldo", "Summe", &["a".into(), "b".into()]);
        assert_eq!(calc.source_id, "saldo:a,b");

        assert_eq!(user_input("u1", "Eingabe").source_id, "user:u1");
        assert_eq!(ai_inference("Gemini AI", "Antwort").kind, ProvenanceKind::AiInference);
    }

    #[test]
    fn test_combine_dedupes_in_first_seen_order() {
        let first = vec![
            database_record("checks", "c1", Some("erste")),
            rule_reference("R1", None),
        ];
        let second = vec![
            database_record("checks", "c1", Some("zweite")),
            database_record("checks", "c2", None),
            // same source id, different kind: kept
            ai_inference("checks#c1", "x"),
        ];

        let combined = combine([first.as_slice(), second.as_slice()]);
        let ids: Vec<_> = combined.iter().map(|p| p.source_id.as_str()).collect();

        assert_eq!(ids, vec!["checks#c1", "R1", "checks#c2", "checks#c1"]);
        assert_eq!(combined[0].description, "erste");
    }

    #[test]
    fn test_combine_empty() {
        assert!(combine(std::iter::empty::<&[ProvenanceInfo]>()).is_empty());
    }
}

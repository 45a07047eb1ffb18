//! Quality indicators: building, merging, formatting

use super::{clamp_unit, percent};
use crate::models::{
    ConfidenceBreakdown, ConfidenceLevel, HistoricalAccuracy, QualityIndicators,
};

const DATA_QUALITY_WEIGHT: f64 = 0.4;
const PATTERN_MATCH_WEIGHT: f64 = 0.3;
const RULE_MATCH_WEIGHT: f64 = 0.3;

/// Placeholder listed as missing when nothing could be analysed
pub const NO_DATA: &str = "Keine Daten verfügbar";

/// Component scores that make up the overall confidence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceFactors {
    pub data_quality: f64,
    pub pattern_match: f64,
    pub rule_match: f64,
}

impl ConfidenceFactors {
    pub fn new(data_quality: f64, pattern_match: f64, rule_match: f64) -> Self {
        Self {
            data_quality: clamp_unit(data_quality),
            pattern_match: clamp_unit(pattern_match),
            rule_match: clamp_unit(rule_match),
        }
    }

    pub fn overall(&self) -> f64 {
        DATA_QUALITY_WEIGHT * self.data_quality
            + PATTERN_MATCH_WEIGHT * self.pattern_match
            + RULE_MATCH_WEIGHT * self.rule_match
    }
}

/// Quality indicators for one result.
///
/// `completeness` is a percentage; `historical` is `(similar_cases, correct_predictions)`.
pub fn build_quality(
    completeness: f64,
    missing_fields: Vec<String>,
    rule_conformity: bool,
    factors: ConfidenceFactors,
    deviations: Vec<String>,
    historical: Option<(u32, u32)>,
) -> QualityIndicators {
    let overall = factors.overall();

    QualityIndicators {
        data_completeness: clamp_percent(completeness),
        missing_fields,
        rule_conformity,
        deviations,
        historical_accuracy: historical.map(|(similar, correct)| historical_accuracy(similar, correct)),
        confidence_breakdown: ConfidenceBreakdown {
            data_quality: factors.data_quality,
            pattern_match: factors.pattern_match,
            rule_match: factors.rule_match,
            overall,
        },
        confidence_level: ConfidenceLevel::from_score(overall),
    }
}

/// The zero indicator: nothing known, nothing conforming.
pub fn default_quality() -> QualityIndicators {
    QualityIndicators {
        data_completeness: 0.0,
        missing_fields: vec![NO_DATA.to_string()],
        rule_conformity: false,
        deviations: Vec::new(),
        historical_accuracy: None,
        confidence_breakdown: ConfidenceBreakdown {
            data_quality: 0.0,
            pattern_match: 0.0,
            rule_match: 0.0,
            overall: 0.0,
        },
        confidence_level: ConfidenceLevel::Low,
    }
}

/// Merge indicators across a batch.
///
/// Numeric fields are averaged, missing fields and deviations are unioned in
/// first-seen order, conformity requires all inputs to conform. Historical
/// case counts are summed. An empty slice yields [`default_quality`]; a
/// single element is returned unchanged.
pub fn merge_quality(indicators: &[QualityIndicators]) -> QualityIndicators {
    match indicators {
        [] => return default_quality(),
        [single] => return single.clone(),
        _ => {}
    }

    let n = indicators.len() as f64;
    let mean = |f: fn(&QualityIndicators) -> f64| indicators.iter().map(f).sum::<f64>() / n;

    let overall = mean(|q| q.confidence_breakdown.overall);

    let historical = indicators
        .iter()
        .filter_map(|q| q.historical_accuracy)
        .fold(None::<(u32, u32)>, |acc, h| {
            let (similar, correct) = acc.unwrap_or((0, 0));
            Some((
                similar.saturating_add(h.similar_cases),
                correct.saturating_add(h.correct_predictions),
            ))
        });

    QualityIndicators {
        data_completeness: mean(|q| q.data_completeness),
        missing_fields: union(indicators.iter().map(|q| &q.missing_fields)),
        rule_conformity: indicators.iter().all(|q| q.rule_conformity),
        deviations: union(indicators.iter().map(|q| &q.deviations)),
        historical_accuracy: historical.map(|(similar, correct)| historical_accuracy(similar, correct)),
        confidence_breakdown: ConfidenceBreakdown {
            data_quality: mean(|q| q.confidence_breakdown.data_quality),
            pattern_match: mean(|q| q.confidence_breakdown.pattern_match),
            rule_match: mean(|q| q.confidence_breakdown.rule_match),
            overall,
        },
        confidence_level: ConfidenceLevel::from_score(overall),
    }
}

/// Plain-text quality block
pub fn format_quality(quality: &QualityIndicators) -> String {
    let mut lines = vec![
        format!(
            "QUALITÄTSINDIKATOREN [{}] {}%",
            quality.confidence_level,
            percent(quality.confidence_breakdown.overall)
        ),
        String::new(),
        format!("Datenvollständigkeit: {}%", quality.data_completeness.round() as i64),
    ];

    if !quality.missing_fields.is_empty() {
        lines.push(format!("  Fehlend: {}", quality.missing_fields.join(", ")));
    }

    lines.push(String::new());
    lines.push(format!(
        "Regelkonformität: {}",
        if quality.rule_conformity {
            "eingehalten"
        } else {
            "Abweichungen"
        }
    ));
    for deviation in &quality.deviations {
        lines.push(format!("  - {}", deviation));
    }

    if let Some(history) = &quality.historical_accuracy {
        lines.push(String::new());
        lines.push(format!(
            "Historische Trefferquote: {}% ({}/{})",
            percent(history.accuracy),
            history.correct_predictions,
            history.similar_cases
        ));
    }

    lines.join("\n")
}

fn historical_accuracy(similar_cases: u32, correct_predictions: u32) -> HistoricalAccuracy {
    let accuracy = if similar_cases > 0 {
        clamp_unit(correct_predictions as f64 / similar_cases as f64)
    } else {
        0.0
    };

    HistoricalAccuracy {
        similar_cases,
        correct_predictions,
        accuracy,
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn union<'a>(lists: impl Iterator<Item = &'a Vec<String>>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for item in lists.flatten() {
        if !merged.contains(item) {
            merged.push(item.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(completeness: f64, dq: f64, conform: bool, missing: &[&str]) -> QualityIndicators {
        build_quality(
            completeness,
            missing.iter().map(|s| s.to_string()).collect(),
            conform,
            ConfidenceFactors::new(dq, 0.5, 1.0),
            vec![],
            None,
        )
    }

    #[test]
    fn test_weighted_overall_and_banding() {
        let q = build_quality(
            100.0,
            vec![],
            true,
            ConfidenceFactors::new(1.0, 0.5, 0.5),
            vec![],
            Some((10, 8)),
        );

        assert!((q.confidence_breakdown.overall - 0.7).abs() < 1e-9);
        assert_eq!(q.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(q.historical_accuracy.unwrap().accuracy, 0.8);
    }

    #[test]
    fn test_historical_accuracy_with_no_cases() {
        let q = build_quality(50.0, vec![], true, ConfidenceFactors::new(0.0, 0.0, 0.0), vec![], Some((0, 0)));
        assert_eq!(q.historical_accuracy.unwrap().accuracy, 0.0);
    }

    #[test]
    fn test_merge_empty_is_default() {
        assert_eq!(merge_quality(&[]), default_quality());
        assert_eq!(default_quality().missing_fields, vec![NO_DATA.to_string()]);
    }

    #[test]
    fn test_merge_single_is_identity() {
        let q = sample(73.0, 0.9, false, &["Kontonummer"]);
        assert_eq!(merge_quality(std::slice::from_ref(&q)), q);
    }

    #[test]
    fn test_merge_averages_and_unions() {
        let a = sample(100.0, 1.0, true, &["A", "B"]);
        let b = sample(50.0, 0.0, false, &["B", "C"]);
        let merged = merge_quality(&[a.clone(), b.clone()]);

        assert_eq!(merged.data_completeness, 75.0);
        assert_eq!(merged.confidence_breakdown.data_quality, 0.5);
        assert!(!merged.rule_conformity);
        assert_eq!(merged.missing_fields, vec!["A", "B", "C"]);

        let expected_overall =
            (a.confidence_breakdown.overall + b.confidence_breakdown.overall) / 2.0;
        assert!((merged.confidence_breakdown.overall - expected_overall).abs() < 1e-9);
        assert_eq!(merged.confidence_level, ConfidenceLevel::from_score(expected_overall));
    }

    #[test]
    fn test_merge_sums_history() {
        let mut a = sample(100.0, 1.0, true, &[]);
        a.historical_accuracy = Some(historical_accuracy(4, 3));
        let b = sample(100.0, 1.0, true, &[]);
        let mut c = sample(100.0, 1.0, true, &[]);
        c.historical_accuracy = Some(historical_accuracy(6, 5));

        let merged = merge_quality(&[a, b, c]);
        let history = merged.historical_accuracy.unwrap();
        assert_eq!(history.similar_cases, 10);
        assert_eq!(history.correct_predictions, 8);
        assert_eq!(history.accuracy, 0.8);
    }

    #[test]
    fn test_format_quality() {
        let mut q = sample(80.0, 1.0, false, &["Belegdatum"]);
        q.deviations = vec!["Saldo weicht ab".to_string()];
        let text = format_quality(&q);

        assert!(text.starts_with("QUALITÄTSINDIKATOREN [HOCH] 85%"));
        assert!(text.contains("Datenvollständigkeit: 80%"));
        assert!(text.contains("Fehlend: Belegdatum"));
        assert!(text.contains("Regelkonformität: Abweichungen"));
        assert!(text.contains("  - Saldo weicht ab"));
    }
}

//! Disclaimer texts attached to every agent response

use crate::models::{ModeType, QualityIndicators};

pub const GENERAL: &str = "Hinweis: Diese AI-Analyse dient als Unterstützung und ersetzt nicht die professionelle Beurteilung des Wirtschaftsprüfers. Alle Empfehlungen sind zu prüfen und zu dokumentieren.";

pub const ACTION: &str = "Aktions-Modus: Änderungen werden erst nach Ihrer expliziten Bestätigung durchgeführt. Sie tragen die Verantwortung für alle durchgeführten Aktionen.";

/// Completeness (percent) below which the data-quality note is appended
pub const DATA_QUALITY_THRESHOLD: f64 = 90.0;

pub fn data_quality(completeness_percent: f64) -> Option<String> {
    if completeness_percent < DATA_QUALITY_THRESHOLD {
        Some(format!(
            "Datenqualität: Nur {}% der erforderlichen Daten liegen vor. Die Analyse ist entsprechend eingeschränkt.",
            completeness_percent.round() as i64
        ))
    } else {
        None
    }
}

/// Mode disclaimer, plus the data-quality note when completeness is low.
pub fn for_context(mode: ModeType, quality: Option<&QualityIndicators>) -> String {
    let mut parts = vec![match mode {
        ModeType::Action => ACTION.to_string(),
        ModeType::Explain => GENERAL.to_string(),
    }];

    if let Some(note) = quality.and_then(|q| data_quality(q.data_completeness)) {
        parts.push(note);
    }

    parts.join("\n\n")
}

//! Reasoning synthesis
//!
//! Every tool reports its findings through the same step / confidence /
//! quality vocabulary so responses and audit statistics stay uniform.

use crate::config::DEFAULT_HIGHLIGHT_THRESHOLD;
use crate::models::{average_confidence, AlternativeInterpretation, ReasoningChain, ReasoningStep};

pub mod quality;

pub use quality::{
    build_quality, default_quality, format_quality, merge_quality, ConfidenceFactors,
};

/// Conclusion used when a chain has no steps to draw from
pub const INSUFFICIENT_DATA: &str = "Keine ausreichenden Daten für eine Schlussfolgerung.";

/// Builds reasoning chains with a configured highlight threshold
#[derive(Debug, Clone, Copy)]
pub struct ReasoningSynthesizer {
    highlight_threshold: f64,
}

impl ReasoningSynthesizer {
    pub fn new(highlight_threshold: f64) -> Self {
        Self {
            highlight_threshold: clamp_unit(highlight_threshold),
        }
    }

    pub fn highlight_threshold(&self) -> f64 {
        self.highlight_threshold
    }

    /// Assemble a chain. Without a conclusion one is synthesized from the
    /// steps; alternatives are highlighted when mean confidence falls below
    /// the threshold (`threshold_override` replaces the configured one).
    pub fn build_chain(
        &self,
        steps: Vec<ReasoningStep>,
        conclusion: Option<String>,
        threshold_override: Option<f64>,
    ) -> ReasoningChain {
        let threshold = threshold_override
            .map(clamp_unit)
            .unwrap_or(self.highlight_threshold);
        let average = average_confidence(&steps);

        let conclusion = conclusion
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| synthesize_conclusion(&steps));

        ReasoningChain {
            highlight_alternatives: average < threshold,
            steps,
            conclusion,
            alternatives: Vec::new(),
        }
    }

    /// Same as [`build_chain`](Self::build_chain) with alternative interpretations attached.
    pub fn build_chain_with_alternatives(
        &self,
        steps: Vec<ReasoningStep>,
        conclusion: Option<String>,
        alternatives: Vec<AlternativeInterpretation>,
    ) -> ReasoningChain {
        let mut chain = self.build_chain(steps, conclusion, None);
        chain.alternatives = alternatives;
        chain
    }
}

impl Default for ReasoningSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_HIGHLIGHT_THRESHOLD)
    }
}

/// Zero-step chain for error paths.
pub fn empty_chain(message: impl Into<String>) -> ReasoningChain {
    ReasoningChain::empty(message)
}

pub fn create_step(
    observation: impl Into<String>,
    inference: impl Into<String>,
    confidence: f64,
    supporting_data_refs: Vec<String>,
) -> ReasoningStep {
    ReasoningStep {
        observation: observation.into(),
        inference: inference.into(),
        confidence: clamp_unit(confidence),
        supporting_data_refs,
    }
}

pub fn create_alternative(
    interpretation: impl Into<String>,
    probability: f64,
    check_question: impl Into<String>,
) -> AlternativeInterpretation {
    AlternativeInterpretation {
        interpretation: interpretation.into(),
        probability: clamp_unit(probability),
        check_question: check_question.into(),
    }
}

/// "Mit N% Wahrscheinlichkeit: <strongest inference>"
fn synthesize_conclusion(steps: &[ReasoningStep]) -> String {
    // First of equally confident steps wins
    let strongest = steps.iter().fold(None::<&ReasoningStep>, |best, step| match best {
        Some(b) if b.confidence >= step.confidence => Some(b),
        _ => Some(step),
    });

    match strongest {
        Some(step) => format!(
            "Mit {}% Wahrscheinlichkeit: {}",
            percent(average_confidence(steps)),
            step.inference
        ),
        None => INSUFFICIENT_DATA.to_string(),
    }
}

/// Plain-text explanation block
pub fn format_reasoning(chain: &ReasoningChain) -> String {
    let mut lines = vec!["BEGRÜNDUNG".to_string(), String::new()];

    for (i, step) in chain.steps.iter().enumerate() {
        lines.push(format!("Schritt {}:", i + 1));
        lines.push(format!("  - {}", step.observation));
        lines.push(format!("  > Inferenz: {}", step.inference));
        lines.push(format!("  > Konfidenz: {}%", percent(step.confidence)));
        lines.push(String::new());
    }

    lines.push(format!("FAZIT: {}", chain.conclusion));

    if !chain.alternatives.is_empty() {
        lines.push(String::new());
        lines.push("Alternative Interpretationen:".to_string());
        for alt in &chain.alternatives {
            lines.push(format!("  - {} ({}%)", alt.interpretation, percent(alt.probability)));
            lines.push(format!("    > {}", alt.check_question));
        }
    }

    lines.join("\n")
}

pub(crate) fn percent(value: f64) -> i64 {
    (value * 100.0).round() as i64
}

/// Clamp into [0, 1]; NaN counts as 0.
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

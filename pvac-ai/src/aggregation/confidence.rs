// Confidence Synthesizer - Overall Product Confidence
//
// Concept: Collapse an aggregation result into one scalar confidence in
// [0.0, 1.0] plus human-readable notes explaining every deduction.
// Synchronization: Accepts AggregationResult (or a historical export's JSON),
// outputs ConfidenceReport.
//
// Algorithm:
// 1. visual_consensus present: average per-dimension confidence, subtract
//    0.08 per disagreeing dimension (penalty capped at 0.5)
// 2. Otherwise (legacy shape): start at 1.0, subtract 0.2 x missing-score
//    fraction, 0.1 per disputed attribute (capped at 0.5) and 0.15 per score
//    outlier (capped at 0.4)
// 3. Clamp to [0.0, 1.0]

use crate::types::AggregationResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Penalty per dimension flagged with disagreement
pub const DIMENSION_DISAGREEMENT_PENALTY: f64 = 0.08;
/// Cap on the total dimension disagreement penalty
pub const DIMENSION_DISAGREEMENT_PENALTY_CAP: f64 = 0.5;
/// Weight of the missing-score fraction (legacy path)
pub const MISSING_SCORE_WEIGHT: f64 = 0.2;
/// Penalty per disputed attribute (legacy path)
pub const ATTRIBUTE_DISAGREEMENT_PENALTY: f64 = 0.1;
/// Cap on the total attribute penalty (legacy path)
pub const ATTRIBUTE_DISAGREEMENT_PENALTY_CAP: f64 = 0.5;
/// Penalty per score outlier (legacy path)
pub const SCORE_DISAGREEMENT_PENALTY: f64 = 0.15;
/// Cap on the total score outlier penalty (legacy path)
pub const SCORE_DISAGREEMENT_PENALTY_CAP: f64 = 0.4;

const NO_ISSUES_NOTE: &str = "no notable disagreements or missing values";

/// Overall confidence with the notes that explain it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceReport {
    pub confidence: f64,
    pub notes: Vec<String>,
}

/// Score summary of the legacy aggregate shape
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyScoreSummary {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub missing: usize,
}

/// Inputs of the legacy confidence path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyAggregate {
    pub score_summary: LegacyScoreSummary,
    /// Names of disputed attributes
    pub attribute_disagreements: Vec<String>,
    /// Number of score outliers
    pub score_disagreements: usize,
}

/// Synthesize overall confidence for an aggregation result
pub fn synthesize(result: &AggregationResult) -> ConfidenceReport {
    if result.visual_consensus.is_empty() {
        return synthesize_legacy(&LegacyAggregate {
            attribute_disagreements: result.attribute_disagreements.keys().cloned().collect(),
            ..LegacyAggregate::default()
        });
    }

    synthesize_dimensions(
        result
            .visual_consensus
            .iter()
            .map(|(name, c)| (name.as_str(), Some(c.confidence), c.disagreement)),
    )
}

/// Primary path over (dimension, confidence, disagreement) triples
fn synthesize_dimensions<'a>(
    dimensions: impl Iterator<Item = (&'a str, Option<f64>, bool)>,
) -> ConfidenceReport {
    let mut confidences = Vec::new();
    let mut disputed = Vec::new();

    for (name, confidence, disagreement) in dimensions {
        if let Some(c) = confidence {
            confidences.push(c);
        }
        if disagreement {
            disputed.push(name);
        }
    }

    let mean_confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };

    let mut confidence = mean_confidence.clamp(0.0, 1.0);
    let mut notes = vec![format!(
        "visual_consensus mean confidence: {:.3}",
        mean_confidence
    )];

    if !disputed.is_empty() {
        notes.push(format!("dimensions with disagreement: {:?}", disputed));
        let penalty = (DIMENSION_DISAGREEMENT_PENALTY * disputed.len() as f64)
            .min(DIMENSION_DISAGREEMENT_PENALTY_CAP);
        confidence = (confidence - penalty).max(0.0);
    }

    debug!(
        "Dimension confidence: mean={:.3}, disputed={}, final={:.3}",
        mean_confidence,
        disputed.len(),
        confidence
    );

    ConfidenceReport { confidence, notes }
}

/// Legacy confidence path
pub fn synthesize_legacy(aggregate: &LegacyAggregate) -> ConfidenceReport {
    let mut confidence = 1.0;
    let mut notes = Vec::new();

    let LegacyScoreSummary { count, missing } = aggregate.score_summary;
    let total_images = count + missing;
    if total_images > 0 && missing > 0 {
        let missing_fraction = missing as f64 / total_images as f64;
        notes.push(format!(
            "{} of {} images missing numeric scores",
            missing, total_images
        ));
        confidence -= MISSING_SCORE_WEIGHT * missing_fraction;
    }

    if !aggregate.attribute_disagreements.is_empty() {
        notes.push(format!(
            "attribute disagreements: {:?}",
            aggregate.attribute_disagreements
        ));
        confidence -= (ATTRIBUTE_DISAGREEMENT_PENALTY
            * aggregate.attribute_disagreements.len() as f64)
            .min(ATTRIBUTE_DISAGREEMENT_PENALTY_CAP);
    }

    if aggregate.score_disagreements > 0 {
        notes.push(format!(
            "score disagreements: {} outlier(s)",
            aggregate.score_disagreements
        ));
        confidence -= (SCORE_DISAGREEMENT_PENALTY * aggregate.score_disagreements as f64)
            .min(SCORE_DISAGREEMENT_PENALTY_CAP);
    }

    if notes.is_empty() {
        notes.push(NO_ISSUES_NOTE.to_string());
    }

    ConfidenceReport {
        confidence: confidence.clamp(0.0, 1.0),
        notes,
    }
}

/// Synthesize confidence from an aggregate in JSON form
///
/// Accepts the current shape (`visual_consensus`) and the legacy shape
/// (`score_summary`, `score_disagreements`, `attribute_disagreements`) found
/// in historical exports.
pub fn synthesize_value(aggregated: &Value) -> ConfidenceReport {
    let consensus = aggregated
        .get("visual_consensus")
        .and_then(Value::as_object)
        .filter(|m| !m.is_empty());

    if let Some(consensus) = consensus {
        return synthesize_dimensions(consensus.iter().map(|(name, info)| {
            let confidence = info.get("confidence").and_then(Value::as_f64);
            let disagreement = info
                .get("disagreement")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            (name.as_str(), confidence, disagreement)
        }));
    }

    let score_summary = aggregated
        .get("score_summary")
        .cloned()
        .and_then(|v| serde_json::from_value::<LegacyScoreSummary>(v).ok())
        .unwrap_or_default();

    // Disputed attributes as a mapping keyed by name or a list of names
    let attribute_disagreements = match aggregated.get("attribute_disagreements") {
        Some(Value::Object(map)) => map.keys().cloned().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
            .collect(),
        _ => Vec::new(),
    };

    // Outliers as a list or a bare count
    let score_disagreements = match aggregated.get("score_disagreements") {
        Some(Value::Array(items)) => items.len(),
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize).unwrap_or(0),
        _ => 0,
    };

    synthesize_legacy(&LegacyAggregate {
        score_summary,
        attribute_disagreements,
        score_disagreements,
    })
}

// Consensus Aggregator - Per-Dimension Statistics and Attribute Voting
//
// Concept: Combine N independent, noisy per-image analyses into one
// product-level consensus without hiding disagreement or inventing data.
// Synchronization: Accepts the full batch of per-image records (loose JSON),
// outputs AggregationResult.
//
// Algorithm:
// 1. Dimension pass: collect (image_index, score) per dimension; skip
//    values that are not numeric
// 2. Per dimension: mean, [min, max], confidence = contributors / N,
//    disagreement = spread > threshold
// 3. Attribute pass: every list element is an independent vote
// 4. Per attribute: majority vote over non-uncertain votes, confidence
//    relative to ALL votes, ties resolve to "uncertain"
// 5. Flag attributes with several opinions and a weak winner

use crate::normalize::attributes::extract_text;
use crate::types::{
    AggregationResult, AttributeDisagreement, AttributeName, AttributeSummary,
    DimensionConsensus, DimensionName, ScoreOutcome, SkipReason, UNCERTAIN,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Score spread above which a dimension is flagged as disputed
///
/// Scores span a 10-unit scale; a spread over 40% of it indicates
/// qualitatively different judgments rather than noise.
pub const DISAGREEMENT_RANGE_THRESHOLD: f64 = 4.0;

/// Winner confidence below which a multi-valued attribute is disputed
pub const ATTRIBUTE_DISAGREEMENT_CONFIDENCE: f64 = 0.6;

/// Consensus aggregator (product-level fusion concept)
///
/// Pure and deterministic: no I/O, no shared state, never fails.
#[derive(Debug, Clone)]
pub struct ConsensusAggregator {
    /// Strict lower bound on (max - min) for dimension disagreement
    disagreement_range_threshold: f64,
    /// Strict upper bound on winner confidence for attribute disagreement
    attribute_disagreement_confidence: f64,
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self {
            disagreement_range_threshold: DISAGREEMENT_RANGE_THRESHOLD,
            attribute_disagreement_confidence: ATTRIBUTE_DISAGREEMENT_CONFIDENCE,
        }
    }
}

impl ConsensusAggregator {
    /// Aggregate a batch of per-image records
    ///
    /// Records that are not objects, or whose `visual_measurements` /
    /// `attributes` blocks are not objects, simply contribute nothing.
    pub fn aggregate(&self, batch: &[Value]) -> AggregationResult {
        let total_images = batch.len();

        // dimension -> (image_index, score); index kept for traceability
        let mut dimension_scores: BTreeMap<DimensionName, Vec<(usize, f64)>> = BTreeMap::new();
        // attribute -> votes in image order
        let mut attribute_votes: BTreeMap<AttributeName, Vec<String>> = BTreeMap::new();
        let mut skipped_scores = 0usize;

        for (index, image) in batch.iter().enumerate() {
            let Some(record) = image.as_object() else {
                debug!(image_index = index, "Skipping non-object image record");
                continue;
            };

            if let Some(measurements) = record.get("visual_measurements").and_then(Value::as_object) {
                for (dimension, item) in measurements {
                    let scores = dimension_scores.entry(dimension.clone()).or_default();
                    match read_score(item) {
                        ScoreOutcome::Score(score) => scores.push((index, score)),
                        ScoreOutcome::Skipped(reason) => {
                            skipped_scores += 1;
                            debug!(
                                image_index = index,
                                dimension = %dimension,
                                reason = ?reason,
                                "Dimension value skipped"
                            );
                        }
                    }
                }
            }

            if let Some(attributes) = record.get("attributes").and_then(Value::as_object) {
                for (name, value) in attributes {
                    let image_votes: Vec<String> = match value {
                        Value::Array(items) => items.iter().map(vote_token).collect(),
                        other => vec![vote_token(other)],
                    };
                    // An empty list casts no vote and creates no entry
                    if image_votes.is_empty() {
                        continue;
                    }
                    attribute_votes
                        .entry(name.clone())
                        .or_default()
                        .extend(image_votes);
                }
            }
        }

        let visual_consensus: BTreeMap<_, _> = dimension_scores
            .into_iter()
            .map(|(dimension, pairs)| {
                let consensus = self.dimension_consensus(&pairs, total_images);
                (dimension, consensus)
            })
            .collect();

        let mut attribute_summary = BTreeMap::new();
        let mut attribute_disagreements = BTreeMap::new();

        for (name, votes) in attribute_votes {
            let summary = summarize_votes(&votes);

            let distinct_values = summary.counts.keys().filter(|k| *k != UNCERTAIN).count();
            if distinct_values > 1 && summary.confidence < self.attribute_disagreement_confidence {
                attribute_disagreements.insert(
                    name.clone(),
                    AttributeDisagreement {
                        counts: summary.counts.clone(),
                        winner: summary.value.clone(),
                        confidence: summary.confidence,
                    },
                );
            }

            attribute_summary.insert(name, summary);
        }

        info!(
            images = total_images,
            dimensions = visual_consensus.len(),
            disputed_dimensions = visual_consensus.values().filter(|c| c.disagreement).count(),
            attributes = attribute_summary.len(),
            disputed_attributes = attribute_disagreements.len(),
            skipped_scores,
            "Aggregation complete"
        );

        AggregationResult {
            visual_consensus,
            attribute_summary,
            attribute_disagreements,
            raw: batch.to_vec(),
        }
    }

    /// Statistics for one dimension from its contributing scores
    fn dimension_consensus(&self, pairs: &[(usize, f64)], total_images: usize) -> DimensionConsensus {
        if pairs.is_empty() {
            // Observed but never scored
            return DimensionConsensus {
                mean: None,
                range: None,
                confidence: 0.0,
                disagreement: false,
            };
        }

        let values: Vec<f64> = pairs.iter().map(|(_, v)| *v).collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        // Confidence reflects image coverage, not statistical certainty
        let confidence = if total_images > 0 {
            values.len() as f64 / total_images as f64
        } else {
            0.0
        };

        DimensionConsensus {
            mean: Some(mean),
            range: Some([min, max]),
            confidence,
            disagreement: (max - min) > self.disagreement_range_threshold,
        }
    }
}

/// Aggregate a batch with the default thresholds
pub fn aggregate(batch: &[Value]) -> AggregationResult {
    ConsensusAggregator::default().aggregate(batch)
}

/// Read one dimension value from a loose record
///
/// Accepts numbers and strings that parse as floats in full; anything else
/// is a skip, never an error.
pub fn read_score(item: &Value) -> ScoreOutcome {
    let Some(object) = item.as_object() else {
        return ScoreOutcome::Skipped(SkipReason::NotAnObject);
    };

    let value = match object.get("score") {
        None | Some(Value::Null) => return ScoreOutcome::Skipped(SkipReason::MissingScore),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match value {
        Some(v) if v.is_finite() => ScoreOutcome::Score(v),
        Some(_) => ScoreOutcome::Skipped(SkipReason::NonFinite),
        None => ScoreOutcome::Skipped(SkipReason::NonNumeric(
            object.get("score").map(Value::to_string).unwrap_or_default(),
        )),
    }
}

/// Token a raw attribute value votes for
fn vote_token(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNCERTAIN.to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Object(_) | Value::Array(_) => {
            let text = extract_text(value);
            if text.is_empty() {
                UNCERTAIN.to_string()
            } else {
                text
            }
        }
    }
}

/// Majority winner among non-uncertain votes
///
/// Returns the winner and its count, or `None` when there are no candidate
/// votes or the highest count is shared (ties are never guessed).
pub fn majority_vote<S: AsRef<str>>(votes: &[S]) -> Option<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for vote in votes.iter().map(AsRef::as_ref).filter(|v| *v != UNCERTAIN) {
        *counts.entry(vote).or_default() += 1;
    }

    let top_count = counts.values().copied().max()?;
    let mut leaders = counts.iter().filter(|(_, c)| **c == top_count);

    let (winner, _) = leaders.next()?;
    if leaders.next().is_some() {
        return None;
    }
    Some((winner.to_string(), top_count))
}

/// Summarize all votes for one attribute
///
/// Confidence = winner count / total votes, uncertain votes included: 3 of
/// 5 votes for "red" with 2 "uncertain" gives 0.6, not 1.0.
pub fn summarize_votes<S: AsRef<str>>(votes: &[S]) -> AttributeSummary {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for vote in votes {
        *counts.entry(vote.as_ref().to_string()).or_default() += 1;
    }

    let (value, confidence) = match majority_vote(votes) {
        Some((winner, count)) => (winner, count as f64 / votes.len() as f64),
        None => (UNCERTAIN.to_string(), 0.0),
    };

    AttributeSummary {
        value,
        confidence,
        counts,
    }
}

//! Per-image record validation
//!
//! The final gate before a record is cached or aggregated. Every violation
//! found is reported, not just the first, so a failing record can be
//! diagnosed from a single error.

use crate::error::{AnalysisError, AnalysisResult};
use crate::normalize::measurements::{SCORE_MAX, SCORE_MIN};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Dimensions every image analysis must score
pub const REQUIRED_DIMENSIONS: [&str; 5] = [
    "gender_expression",
    "visual_weight",
    "embellishment",
    "unconventionality",
    "formality",
];

const SCORE_FIELDS: [&str; 3] = ["score", "justification", "uncertain"];
const RECORD_FIELDS: [&str; 4] = ["image_id", "visual_measurements", "attributes", "confidence_notes"];

/// Validated dimension score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualScore {
    pub score: f64,
    pub justification: String,
    pub uncertain: bool,
}

/// Validated measurement block (exactly the required dimensions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VisualMeasurements {
    pub gender_expression: VisualScore,
    pub visual_weight: VisualScore,
    pub embellishment: VisualScore,
    pub unconventionality: VisualScore,
    pub formality: VisualScore,
}

/// Validated per-image analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImageAnalysis {
    pub image_id: String,
    pub visual_measurements: VisualMeasurements,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub confidence_notes: Option<String>,
}

/// Validate a candidate per-image record
///
/// Checks required dimensions, score range, non-empty justifications,
/// boolean uncertainty flags, and rejects unknown fields at every level.
/// `image_id` is trimmed.
pub fn validate_image_analysis(candidate: &Value) -> AnalysisResult<ImageAnalysis> {
    let Some(record) = candidate.as_object() else {
        return Err(AnalysisError::Validation {
            violations: vec!["record must be a JSON object".to_string()],
        });
    };

    let mut violations = Vec::new();

    unknown_fields(record, &RECORD_FIELDS, "record", &mut violations);

    match record.get("image_id") {
        Some(Value::String(_)) => {}
        Some(_) => violations.push("image_id must be a string".to_string()),
        None => violations.push("image_id is required".to_string()),
    }

    match record.get("visual_measurements") {
        Some(Value::Object(measurements)) => check_measurements(measurements, &mut violations),
        Some(_) => violations.push("visual_measurements must be an object".to_string()),
        None => violations.push("visual_measurements is required".to_string()),
    }

    if let Some(attributes) = record.get("attributes") {
        if !attributes.is_object() {
            violations.push("attributes must be an object".to_string());
        }
    }

    if let Some(notes) = record.get("confidence_notes") {
        if !(notes.is_string() || notes.is_null()) {
            violations.push("confidence_notes must be a string".to_string());
        }
    }

    if !violations.is_empty() {
        return Err(AnalysisError::Validation { violations });
    }

    let mut analysis: ImageAnalysis = serde_json::from_value(candidate.clone())
        .map_err(|e| AnalysisError::Validation {
            violations: vec![e.to_string()],
        })?;
    analysis.image_id = analysis.image_id.trim().to_string();
    if let Some(notes) = analysis.confidence_notes.as_mut() {
        *notes = notes.trim().to_string();
    }

    Ok(analysis)
}

fn check_measurements(measurements: &Map<String, Value>, violations: &mut Vec<String>) {
    unknown_fields(measurements, &REQUIRED_DIMENSIONS, "visual_measurements", violations);

    for dimension in REQUIRED_DIMENSIONS {
        match measurements.get(dimension) {
            None => violations.push(format!("visual_measurements.{} is required", dimension)),
            Some(Value::Object(item)) => check_score_item(dimension, item, violations),
            Some(_) => violations.push(format!("visual_measurements.{} must be an object", dimension)),
        }
    }
}

fn check_score_item(dimension: &str, item: &Map<String, Value>, violations: &mut Vec<String>) {
    let path = format!("visual_measurements.{}", dimension);
    unknown_fields(item, &SCORE_FIELDS, &path, violations);

    match item.get("score").map(|s| (s, s.as_f64())) {
        None | Some((Value::Null, _)) => violations.push(format!("{}.score is required", path)),
        Some((_, Some(score))) if (SCORE_MIN..=SCORE_MAX).contains(&score) => {}
        Some((_, Some(score))) => violations.push(format!(
            "{}.score {} outside [{}, {}]",
            path, score, SCORE_MIN, SCORE_MAX
        )),
        Some((_, None)) => violations.push(format!("{}.score must be a number", path)),
    }

    match item.get("justification") {
        Some(Value::String(s)) if !s.trim().is_empty() => {}
        Some(Value::String(_)) => violations.push(format!("{}.justification must not be empty", path)),
        Some(_) => violations.push(format!("{}.justification must be a string", path)),
        None => violations.push(format!("{}.justification is required", path)),
    }

    match item.get("uncertain") {
        Some(Value::Bool(_)) => {}
        Some(_) => violations.push(format!("{}.uncertain must be a boolean", path)),
        None => violations.push(format!("{}.uncertain is required", path)),
    }
}

fn unknown_fields(map: &Map<String, Value>, allowed: &[&str], path: &str, violations: &mut Vec<String>) {
    for key in map.keys().filter(|k| !allowed.contains(&k.as_str())) {
        violations.push(format!("{}: unknown field '{}'", path, key));
    }
}

// Measurement Normalizer - Score Coercion and Clamping
//
// Turns score-like model output into ScoreItems with scores clamped to
// [-5.0, 5.0]. Justification and the uncertainty flag are preserved.
// Diagnostics (clamps, unparsable scores) are collected per item and are
// stripped before the record is validated.

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{DimensionName, ScoreItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Lowest valid score
pub const SCORE_MIN: f64 = -5.0;

/// Highest valid score
pub const SCORE_MAX: f64 = 5.0;

/// Diagnostic tag for a score that is missing or cannot be parsed
pub const MISSING_OR_INVALID_SCORE: &str = "missing_or_invalid_score";

static EMBEDDED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?[0-9]*\.?[0-9]+").expect("valid regex"));

/// Normalized score item plus its diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedScore {
    pub item: ScoreItem,
    /// Diagnostic tags, e.g. "clamped:7.5->5.0"
    pub errors: Vec<String>,
}

/// Coerce a raw score to a finite float
///
/// Numbers are taken directly, numeric strings parsed, and as a last resort
/// the first embedded number is extracted ("score: -3.2" gives -3.2).
pub fn coerce_score(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                s.parse::<f64>().ok().or_else(|| {
                    EMBEDDED_NUMBER
                        .find(s)
                        .and_then(|m| m.as_str().parse::<f64>().ok())
                })
            }
        }
        _ => None,
    };

    parsed.filter(|v| v.is_finite())
}

/// Permissive boolean parsing for the `uncertain` flag
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "y"
        ),
        _ => false,
    }
}

/// Clamp a score into [SCORE_MIN, SCORE_MAX]
pub fn clamp_score(value: f64) -> f64 {
    value.clamp(SCORE_MIN, SCORE_MAX)
}

/// Normalize a single score-like item
///
/// Non-object input is treated as a bare score. Never fails.
pub fn normalize_score_item(raw: &Value) -> NormalizedScore {
    let wrapped;
    let item = if raw.is_object() {
        raw
    } else {
        wrapped = json!({ "score": raw });
        &wrapped
    };

    let mut errors = Vec::new();

    let score = match item.get("score").and_then(coerce_score) {
        None => {
            errors.push(MISSING_OR_INVALID_SCORE.to_string());
            None
        }
        Some(value) => {
            let clamped = clamp_score(value);
            if clamped != value {
                errors.push(format!("clamped:{:?}->{:?}", value, clamped));
            }
            Some(clamped)
        }
    };

    let justification = match item.get("justification") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    let uncertain = item.get("uncertain").map(coerce_bool).unwrap_or(false);

    NormalizedScore {
        item: ScoreItem {
            score,
            justification,
            uncertain,
        },
        errors,
    }
}

/// Parse a `visual_measurements` mapping (name -> score item)
///
/// Entries that are not objects are treated as bare scores.
pub fn parse_measurements(raw: &Value) -> AnalysisResult<BTreeMap<DimensionName, NormalizedScore>> {
    let Some(map) = raw.as_object() else {
        return Err(AnalysisError::InvalidInput(
            "visual_measurements must be a JSON object".to_string(),
        ));
    };

    let results: BTreeMap<_, _> = map
        .iter()
        .map(|(name, value)| (name.clone(), normalize_score_item(value)))
        .collect();

    for (name, normalized) in &results {
        if !normalized.errors.is_empty() {
            debug!("Measurement '{}' diagnostics: {:?}", name, normalized.errors);
        }
    }

    Ok(results)
}

/// Drop diagnostics, keeping the clean per-dimension items
pub fn strip_diagnostics(
    parsed: BTreeMap<DimensionName, NormalizedScore>,
) -> BTreeMap<DimensionName, ScoreItem> {
    parsed
        .into_iter()
        .map(|(name, normalized)| (name, normalized.item))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_score_variants() {
        assert_eq!(coerce_score(&json!(2)), Some(2.0));
        assert_eq!(coerce_score(&json!(-1.5)), Some(-1.5));
        assert_eq!(coerce_score(&json!(" 3.25 ")), Some(3.25));
        assert_eq!(coerce_score(&json!("score: -3.2")), Some(-3.2));
        assert_eq!(coerce_score(&json!("about +4 overall")), Some(4.0));
        assert_eq!(coerce_score(&json!("n/a")), None);
        assert_eq!(coerce_score(&json!("")), None);
        assert_eq!(coerce_score(&json!("NaN")), None);
        assert_eq!(coerce_score(&json!(true)), None);
        assert_eq!(coerce_score(&Value::Null), None);
    }

    #[test]
    fn test_coerce_bool() {
        assert!(coerce_bool(&json!("Yes")));
        assert!(coerce_bool(&json!("1")));
        assert!(coerce_bool(&json!(true)));
        assert!(coerce_bool(&json!(1)));
        assert!(!coerce_bool(&json!("no")));
        assert!(!coerce_bool(&json!("perhaps")));
        assert!(!coerce_bool(&Value::Null));
    }

    #[test]
    fn test_clamp_tags_out_of_range() {
        let n = normalize_score_item(&json!({
            "score": 7.5,
            "justification": "very bold",
            "uncertain": "false"
        }));

        assert_eq!(n.item.score, Some(5.0));
        assert_eq!(n.item.justification.as_deref(), Some("very bold"));
        assert!(!n.item.uncertain);
        assert_eq!(n.errors, vec!["clamped:7.5->5.0".to_string()]);
    }

    #[test]
    fn test_in_range_score_has_no_diagnostics() {
        let n = normalize_score_item(&json!({"score": "-2", "uncertain": "yes"}));
        assert_eq!(n.item.score, Some(-2.0));
        assert!(n.item.uncertain);
        assert!(n.item.justification.is_none());
        assert!(n.errors.is_empty());
    }

    #[test]
    fn test_missing_score_is_tagged() {
        let n = normalize_score_item(&json!({"justification": 42}));
        assert_eq!(n.item.score, None);
        assert_eq!(n.item.justification.as_deref(), Some("42"));
        assert_eq!(n.errors, vec![MISSING_OR_INVALID_SCORE.to_string()]);
    }

    #[test]
    fn test_bare_value_treated_as_score() {
        let n = normalize_score_item(&json!(-9));
        assert_eq!(n.item.score, Some(-5.0));
        assert_eq!(n.errors, vec!["clamped:-9.0->-5.0".to_string()]);
    }

    #[test]
    fn test_parse_measurements_mapping() {
        let parsed = parse_measurements(&json!({
            "formality": {"score": 1.0, "justification": "neat", "uncertain": false},
            "embellishment": 3
        }))
        .unwrap();

        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["embellishment"].item.score, Some(3.0));

        let clean = strip_diagnostics(parsed);
        assert_eq!(clean["formality"].score, Some(1.0));
    }

    #[test]
    fn test_parse_measurements_rejects_non_object() {
        assert!(parse_measurements(&json!([1, 2])).is_err());
    }
}

// Shared Types and Data Contracts
//
// Contracts between the per-image stage (normalizers, validator, pipeline)
// and the product-level stage (consensus aggregator, confidence synthesizer,
// exporter). Output maps are BTreeMaps so serialized results and CSV columns
// come out in a stable order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sentinel for "no confident judgment", distinct from "field not provided"
pub const UNCERTAIN: &str = "uncertain";

/// Visual dimension name (e.g. "formality")
pub type DimensionName = String;

/// Categorical attribute name (e.g. "dominant_colors")
pub type AttributeName = String;

// ============================================================================
// Presence: absent vs explicit null vs value
// ============================================================================

/// Tri-state lookup result for a key in a loose JSON object
///
/// An absent key and an explicit `null` mean different things downstream:
/// absence is never turned into a value, while `null` is an explicit
/// "provided but uninformative" answer that normalizes to `"uncertain"`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence<T> {
    Absent,
    Null,
    Value(T),
}

impl<'a> Presence<&'a Value> {
    /// Look up `key` in `map`, keeping null distinct from absence
    pub fn lookup(map: &'a Map<String, Value>, key: &str) -> Self {
        match map.get(key) {
            None => Presence::Absent,
            Some(Value::Null) => Presence::Null,
            Some(v) => Presence::Value(v),
        }
    }

    /// First present key among `keys` (e.g. a field and its legacy alias)
    pub fn lookup_any(map: &'a Map<String, Value>, keys: &[&str]) -> Self {
        keys.iter()
            .map(|k| Self::lookup(map, k))
            .find(|p| !p.is_absent())
            .unwrap_or(Presence::Absent)
    }
}

impl<T> Presence<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Presence::Absent)
    }
}

// ============================================================================
// Per-image types
// ============================================================================

/// Single visual dimension score
///
/// Invariant: `score`, when present, lies in [-5.0, 5.0].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreItem {
    pub score: Option<f64>,
    pub justification: Option<String>,
    pub uncertain: bool,
}

/// Attribute value: a single category token or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    List(Vec<String>),
}

impl AttributeValue {
    /// Votes this value contributes (each list element is independent)
    pub fn votes(&self) -> Vec<&str> {
        match self {
            AttributeValue::Single(s) => vec![s.as_str()],
            AttributeValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Single(s.to_string())
    }
}

/// Normalized attributes of one image
pub type AttributeMap = BTreeMap<AttributeName, AttributeValue>;

/// Error recorded against an image instead of aborting the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordError {
    /// Pipeline stage that failed (e.g. "analysis", "final_validation")
    pub stage: String,
    pub error: String,
}

/// Per-image record handed to the aggregator
///
/// Error records carry `errors` and omit `visual_measurements`/`attributes`,
/// so they naturally contribute no votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerImageRecord {
    pub image_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_measurements: Option<BTreeMap<DimensionName, ScoreItem>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<AttributeMap>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_notes: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
}

impl PerImageRecord {
    /// Record for an image whose analysis failed at `stage`
    pub fn failed(image_id: impl Into<String>, stage: &str, error: impl ToString) -> Self {
        Self {
            image_id: image_id.into(),
            visual_measurements: None,
            attributes: None,
            confidence_notes: None,
            errors: vec![RecordError {
                stage: stage.to_string(),
                error: error.to_string(),
            }],
        }
    }

    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Loose JSON form consumed by the aggregator
    pub fn to_value(&self) -> Value {
        // Serializing plain structs of strings, floats and maps cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Convert typed records into the aggregator's loose input form
pub fn records_to_values(records: &[PerImageRecord]) -> Vec<Value> {
    records.iter().map(PerImageRecord::to_value).collect()
}

/// Kind of image source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Local,
}

/// Validated image reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Deterministic id (UUIDv5 of the source)
    pub id: String,
    /// URL or canonical local path
    pub source: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
}

// ============================================================================
// Aggregation boundary types
// ============================================================================

/// Why a dimension value did not contribute a score
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Item is not a JSON object
    NotAnObject,
    /// `score` key absent or null
    MissingScore,
    /// `score` present but not convertible to a float
    NonNumeric(String),
    /// `score` parsed to NaN or infinity
    NonFinite,
}

/// Outcome of reading one dimension value from a loose record
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Score(f64),
    Skipped(SkipReason),
}

/// Consensus for one visual dimension across the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionConsensus {
    pub mean: Option<f64>,
    pub range: Option<[f64; 2]>,
    /// Fraction of images contributing a numeric score
    pub confidence: f64,
    /// Score spread exceeds the disagreement threshold
    pub disagreement: bool,
}

/// Majority-vote summary for one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSummary {
    /// Winning category, or "uncertain"
    pub value: String,
    /// Winner votes / total votes (uncertain votes included)
    pub confidence: f64,
    /// Full tally, including an explicit "uncertain" bucket
    pub counts: BTreeMap<String, usize>,
}

/// Attribute with competing opinions and no dominant one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDisagreement {
    pub counts: BTreeMap<String, usize>,
    pub winner: String,
    pub confidence: f64,
}

/// Product-level consensus (terminal output of aggregation)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationResult {
    pub visual_consensus: BTreeMap<DimensionName, DimensionConsensus>,
    pub attribute_summary: BTreeMap<AttributeName, AttributeSummary>,
    pub attribute_disagreements: BTreeMap<AttributeName, AttributeDisagreement>,
    /// Original input batch, kept for auditing
    pub raw: Vec<Value>,
}

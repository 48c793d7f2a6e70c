// Attribute Normalizer - Closed-Vocabulary Category Mapping
//
// Maps free-form categorical model output to a whitelist of canonical
// tokens per attribute, or the "uncertain" sentinel. Never raises for
// malformed values and never invents attributes absent from the input.

use crate::error::{AnalysisError, AnalysisResult};
use crate::types::{AttributeMap, AttributeValue, Presence, UNCERTAIN};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

const COLORS: &[&str] = &[
    "red", "green", "blue", "yellow", "black", "white", "gray", "brown", "orange", "pink",
    "purple", "cyan",
];

const COLOR_SYNONYMS: &[(&str, &str)] = &[("grey", "gray")];

const SHAPES: &[&str] = &[
    "rectangle", "square", "circle", "ellipse", "oval", "triangle", "polygon",
];

const SHAPE_SYNONYMS: &[(&str, &str)] = &[
    ("rect", "rectangle"),
    ("rectangular", "rectangle"),
    ("box", "rectangle"),
    ("sq", "square"),
    ("round", "circle"),
    ("circular", "circle"),
    ("elliptical", "ellipse"),
    ("tri", "triangle"),
    ("triangular", "triangle"),
];

const ORIENTATIONS: &[&str] = &["portrait", "landscape"];

/// Keys that commonly carry a label inside an object-shaped value
const LABEL_KEYS: &[&str] = &["label", "value", "name", "text"];

static PUNCTUATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("valid regex"));

static LIST_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[,&/]|\band\b").expect("valid regex"));

/// How an attribute's raw value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    /// List of colors (each element normalized independently)
    Colors,
    /// Geometric outline
    Shape,
    /// Portrait or landscape
    Orientation,
    /// Transparent, translucent or opaque
    Transparency,
    /// yes / no
    YesNo,
    /// Unconstrained text (kept as-is when non-empty)
    FreeText,
}

impl AttributeKind {
    /// Kind for a known attribute name; unknown names are free text
    pub fn for_name(name: &str) -> Self {
        match name {
            "dominant_colors" | "colors" | "color" => Self::Colors,
            "frame_geometry" | "shape" => Self::Shape,
            "orientation" => Self::Orientation,
            "transparency" => Self::Transparency,
            "visible_wirecore" | "suitable_for_kids" => Self::YesNo,
            _ => Self::FreeText,
        }
    }
}

/// Normalize a present raw value for `attribute_name`
///
/// An explicit `null` yields `"uncertain"` (or `["uncertain"]` for list
/// attributes). Absence is handled by the caller, which omits the key.
pub fn normalize_attribute(attribute_name: &str, raw: &Value) -> AttributeValue {
    match AttributeKind::for_name(attribute_name) {
        AttributeKind::Colors => AttributeValue::List(normalize_colors(raw)),
        AttributeKind::Shape => AttributeValue::Single(normalize_shape(raw)),
        AttributeKind::Orientation => AttributeValue::Single(normalize_orientation(raw)),
        AttributeKind::Transparency => AttributeValue::Single(normalize_transparency(raw)),
        AttributeKind::YesNo => AttributeValue::Single(normalize_yes_no(raw)),
        AttributeKind::FreeText => AttributeValue::Single(normalize_free_text(raw)),
    }
}

/// Parse a whole `attributes` block from model output
///
/// Returned keys:
/// - `dominant_colors` (legacy `color`): only when present in the input
/// - `frame_geometry` (legacy `shape`): only when present
/// - `orientation`: only when present
/// - `transparency`, `visible_texture`, `visible_wirecore`,
///   `suitable_for_kids`: always, `"uncertain"` when missing
pub fn parse_attributes(raw: &Value) -> AnalysisResult<AttributeMap> {
    let Some(map) = raw.as_object() else {
        return Err(AnalysisError::InvalidInput(
            "attributes must be a JSON object".to_string(),
        ));
    };

    let mut out = AttributeMap::new();

    // Optional attributes: never invent a value for an absent field
    let optional: [(&str, &[&str]); 3] = [
        ("dominant_colors", &["dominant_colors", "color"]),
        ("frame_geometry", &["frame_geometry", "shape"]),
        ("orientation", &["orientation"]),
    ];
    for (name, keys) in optional {
        match Presence::lookup_any(map, keys) {
            Presence::Absent => {}
            Presence::Null => {
                out.insert(name.to_string(), normalize_attribute(name, &Value::Null));
            }
            Presence::Value(v) => {
                out.insert(name.to_string(), normalize_attribute(name, v));
            }
        }
    }

    // Requested judgments: a missing answer is an explicit "uncertain"
    for name in [
        "transparency",
        "visible_texture",
        "visible_wirecore",
        "suitable_for_kids",
    ] {
        let raw_value = map.get(name).unwrap_or(&Value::Null);
        out.insert(name.to_string(), normalize_attribute(name, raw_value));
    }

    debug!(
        "Parsed {} attributes ({} uncertain)",
        out.len(),
        out.values()
            .filter(|v| v.votes().iter().all(|t| *t == UNCERTAIN))
            .count()
    );

    Ok(out)
}

/// Extract a textual representation suitable for matching
///
/// Objects yield the first string under a label-like key, lists their first
/// element, scalars their string form. Returns an empty string when nothing
/// sensible can be extracted.
pub fn extract_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => LABEL_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
        Value::Array(items) => items.first().map(extract_text).unwrap_or_default(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
    }
}

/// Lower-case and replace punctuation with spaces
fn clean(text: &str) -> String {
    PUNCTUATION
        .replace_all(&text.to_lowercase(), " ")
        .into_owned()
}

/// Match cleaned text against a vocabulary
///
/// Token pass (synonyms first, then exact vocabulary) followed by a
/// substring pass so that e.g. "lightblue" still resolves to "blue".
fn match_vocabulary(
    text: &str,
    synonyms: &[(&str, &'static str)],
    vocabulary: &[&'static str],
) -> Option<&'static str> {
    for token in text.split_whitespace() {
        if let Some((_, canonical)) = synonyms.iter().find(|(s, _)| *s == token) {
            return Some(*canonical);
        }
        if let Some(word) = vocabulary.iter().find(|w| **w == token) {
            return Some(*word);
        }
    }

    vocabulary.iter().copied().find(|w| text.contains(w))
}

fn normalize_color_text(text: &str) -> String {
    let cleaned = clean(text);
    if cleaned.trim().is_empty() {
        return UNCERTAIN.to_string();
    }
    // Spelling variants are folded before the substring pass
    let folded = COLOR_SYNONYMS
        .iter()
        .fold(cleaned, |acc, (from, to)| acc.replace(from, to));

    match_vocabulary(&folded, &[], COLORS)
        .unwrap_or(UNCERTAIN)
        .to_string()
}

/// Normalize a single color value
pub fn normalize_color(raw: &Value) -> String {
    normalize_color_text(&extract_text(raw))
}

/// Normalize a possibly multi-valued color answer
///
/// Accepts a single color, a separated string ("red, blue and green") or a
/// list. Results are deduplicated in first-seen order. A present value with
/// no recognizable color yields `["uncertain"]`; the result is never empty.
pub fn normalize_colors(raw: &Value) -> Vec<String> {
    let items: Vec<String> = match raw {
        Value::Null => return vec![UNCERTAIN.to_string()],
        Value::Array(values) => values.iter().map(extract_text).collect(),
        other => LIST_SEPARATORS
            .split(&extract_text(other))
            .map(|s| s.trim().to_string())
            .collect(),
    };

    let mut colors: Vec<String> = Vec::new();
    for item in items {
        let color = normalize_color_text(&item);
        if color != UNCERTAIN && !colors.contains(&color) {
            colors.push(color);
        }
    }

    if colors.is_empty() {
        colors.push(UNCERTAIN.to_string());
    }
    colors
}

/// Normalize a frame/outline geometry value
pub fn normalize_shape(raw: &Value) -> String {
    let cleaned = clean(&extract_text(raw));
    if cleaned.trim().is_empty() {
        return UNCERTAIN.to_string();
    }
    match_vocabulary(&cleaned, SHAPE_SYNONYMS, SHAPES)
        .unwrap_or(UNCERTAIN)
        .to_string()
}

/// Normalize portrait/landscape orientation
pub fn normalize_orientation(raw: &Value) -> String {
    let cleaned = clean(&extract_text(raw));
    match_vocabulary(&cleaned, &[], ORIENTATIONS)
        .unwrap_or(UNCERTAIN)
        .to_string()
}

/// Normalize transparency to transparent / translucent / opaque
pub fn normalize_transparency(raw: &Value) -> String {
    let txt = extract_text(raw).to_lowercase();
    if txt.is_empty() {
        return UNCERTAIN.to_string();
    }

    let partial = txt.contains("semi") || txt.contains("part") || txt.contains('%');

    if txt.contains("transparent") && !partial {
        "transparent".to_string()
    } else if txt.contains("translucent") || partial {
        "translucent".to_string()
    } else if txt.contains("opaque") {
        "opaque".to_string()
    } else {
        UNCERTAIN.to_string()
    }
}

/// Normalize a yes/no judgment
pub fn normalize_yes_no(raw: &Value) -> String {
    match raw {
        Value::Null => UNCERTAIN.to_string(),
        Value::Bool(b) => (if *b { "yes" } else { "no" }).to_string(),
        Value::Number(n) => {
            let nonzero = n.as_f64().map(|f| f != 0.0).unwrap_or(false);
            (if nonzero { "yes" } else { "no" }).to_string()
        }
        other => match extract_text(other).to_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => "yes".to_string(),
            "no" | "n" | "false" | "0" => "no".to_string(),
            _ => UNCERTAIN.to_string(),
        },
    }
}

/// Keep free text as-is; empty text is "uncertain"
pub fn normalize_free_text(raw: &Value) -> String {
    let txt = extract_text(raw);
    if txt.is_empty() {
        UNCERTAIN.to_string()
    } else {
        txt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_from_object_and_list() {
        assert_eq!(extract_text(&json!({"label": " Navy Blue "})), "Navy Blue");
        assert_eq!(extract_text(&json!({"other": 1, "name": "red"})), "red");
        assert_eq!(extract_text(&json!([{"text": "oval"}, "square"])), "oval");
        assert_eq!(extract_text(&json!({"label": 3})), "");
        assert_eq!(extract_text(&json!(2.5)), "2.5");
        assert_eq!(extract_text(&json!([])), "");
    }

    #[test]
    fn test_color_token_and_substring_matching() {
        assert_eq!(normalize_color(&json!("Dark RED!")), "red");
        assert_eq!(normalize_color(&json!("lightblue")), "blue");
        assert_eq!(normalize_color(&json!("Grey")), "gray");
        assert_eq!(normalize_color(&json!("chartreuse")), UNCERTAIN);
        assert_eq!(normalize_color(&json!("")), UNCERTAIN);
    }

    #[test]
    fn test_colors_split_and_dedupe() {
        assert_eq!(
            normalize_colors(&json!("red, blue and Red / green")),
            vec!["red", "blue", "green"]
        );
        assert_eq!(
            normalize_colors(&json!(["black", "jet black", {"label": "white"}])),
            vec!["black", "white"]
        );
    }

    #[test]
    fn test_colors_present_but_unmatched_is_uncertain() {
        assert_eq!(normalize_colors(&json!("mauve-ish")), vec![UNCERTAIN]);
        assert_eq!(normalize_colors(&json!("")), vec![UNCERTAIN]);
        assert_eq!(normalize_colors(&json!([])), vec![UNCERTAIN]);
        assert_eq!(normalize_colors(&Value::Null), vec![UNCERTAIN]);
    }

    #[test]
    fn test_shape_synonyms() {
        assert_eq!(normalize_shape(&json!("rectangular")), "rectangle");
        assert_eq!(normalize_shape(&json!("Round frame")), "circle");
        assert_eq!(normalize_shape(&json!("box-like")), "rectangle");
        assert_eq!(normalize_shape(&json!("squared-off polygon")), "polygon");
        assert_eq!(normalize_shape(&json!("aviator")), UNCERTAIN);
    }

    #[test]
    fn test_orientation() {
        assert_eq!(normalize_orientation(&json!("Portrait shot")), "portrait");
        assert_eq!(normalize_orientation(&json!("wide landscape")), "landscape");
        assert_eq!(normalize_orientation(&json!("square")), UNCERTAIN);
    }

    #[test]
    fn test_transparency() {
        assert_eq!(normalize_transparency(&json!("Transparent")), "transparent");
        assert_eq!(normalize_transparency(&json!("semi-transparent")), "translucent");
        assert_eq!(normalize_transparency(&json!("50% see-through")), "translucent");
        assert_eq!(normalize_transparency(&json!("fully opaque")), "opaque");
        assert_eq!(normalize_transparency(&json!("glossy")), UNCERTAIN);
        assert_eq!(normalize_transparency(&Value::Null), UNCERTAIN);
    }

    #[test]
    fn test_yes_no() {
        assert_eq!(normalize_yes_no(&json!(true)), "yes");
        assert_eq!(normalize_yes_no(&json!(0)), "no");
        assert_eq!(normalize_yes_no(&json!(" Y ")), "yes");
        assert_eq!(normalize_yes_no(&json!("False")), "no");
        assert_eq!(normalize_yes_no(&json!("maybe")), UNCERTAIN);
        assert_eq!(normalize_yes_no(&Value::Null), UNCERTAIN);
    }

    #[test]
    fn test_parse_attributes_absent_vs_null() {
        let parsed = parse_attributes(&json!({
            "color": null,
            "transparency": "opaque",
        }))
        .unwrap();

        // Explicit null under the legacy key is present-but-uncertain
        assert_eq!(
            parsed.get("dominant_colors"),
            Some(&AttributeValue::List(vec![UNCERTAIN.to_string()]))
        );
        // Absent optional attributes are omitted, never invented
        assert!(!parsed.contains_key("frame_geometry"));
        assert!(!parsed.contains_key("orientation"));
        // Requested judgments are always reported
        assert_eq!(parsed["transparency"], AttributeValue::from("opaque"));
        assert_eq!(parsed["visible_wirecore"], AttributeValue::from(UNCERTAIN));
        assert_eq!(parsed["visible_texture"], AttributeValue::from(UNCERTAIN));
    }

    #[test]
    fn test_parse_attributes_prefers_current_key_over_legacy() {
        let parsed = parse_attributes(&json!({
            "dominant_colors": ["black"],
            "color": "red",
            "shape": "rect",
        }))
        .unwrap();

        assert_eq!(
            parsed["dominant_colors"],
            AttributeValue::List(vec!["black".to_string()])
        );
        assert_eq!(parsed["frame_geometry"], AttributeValue::from("rectangle"));
    }

    #[test]
    fn test_parse_attributes_rejects_non_object() {
        assert!(matches!(
            parse_attributes(&json!(["red"])),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_unknown_attribute_is_free_text() {
        assert_eq!(
            normalize_attribute("pattern", &json!(" striped ")),
            AttributeValue::from("striped")
        );
        assert_eq!(
            normalize_attribute("pattern", &Value::Null),
            AttributeValue::from(UNCERTAIN)
        );
    }
}

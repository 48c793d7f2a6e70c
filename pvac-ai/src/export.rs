// Product Result Exporter
//
// Writes the final product document `<product_id>.json` and, optionally, a
// one-row summary `<product_id>.csv` into the output directory.
//
// JSON document:
//   { product_id, timestamp (RFC 3339 UTC), confidence, confidence_notes,
//     metadata, result: <aggregation result> }
//
// CSV columns:
//   product_id, timestamp, confidence, confidence_notes, score_mean,
//   score_median, then <dim>_mean, <dim>_confidence, <dim>_disagreement for
//   each visual dimension in sorted order

use crate::aggregation::confidence::{synthesize_value, ConfidenceReport};
use crate::error::{AnalysisError, AnalysisResult};
use crate::types::AggregationResult;
use chrono::{SecondsFormat, Utc};
use pvac_common::uuid_utils;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Export settings
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Product id; a random UUID when `None`
    pub product_id: Option<String>,
    /// Free-form metadata stored alongside the result
    pub metadata: Map<String, Value>,
    pub output_dir: PathBuf,
    /// Also write the flattened CSV row
    pub as_csv: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            product_id: None,
            metadata: Map::new(),
            output_dir: PathBuf::from("outputs"),
            as_csv: false,
        }
    }
}

/// Files written by an export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportPaths {
    pub product_id: String,
    pub json: PathBuf,
    pub csv: Option<PathBuf>,
}

/// Export an aggregation result
pub fn export_product_result(
    aggregated: &AggregationResult,
    options: &ExportOptions,
) -> AnalysisResult<ExportPaths> {
    let value = serde_json::to_value(aggregated)?;
    export_product_value(&value, options)
}

/// Export an aggregate in JSON form (current or legacy shape)
pub fn export_product_value(aggregated: &Value, options: &ExportOptions) -> AnalysisResult<ExportPaths> {
    let product_id = match &options.product_id {
        Some(id) => validate_product_id(id)?,
        None => uuid_utils::generate().to_string(),
    };

    fs::create_dir_all(&options.output_dir).map_err(|e| {
        AnalysisError::Export(format!(
            "cannot create output directory {}: {}",
            options.output_dir.display(),
            e
        ))
    })?;

    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);
    let report = synthesize_value(aggregated);

    let document = json!({
        "product_id": product_id,
        "timestamp": timestamp,
        "confidence": report.confidence,
        "confidence_notes": report.notes,
        "metadata": options.metadata,
        "result": aggregated,
    });

    let json_path = options.output_dir.join(format!("{}.json", product_id));
    write_file(&json_path, &serde_json::to_string_pretty(&document)?)?;

    let csv_path = if options.as_csv {
        let path = options.output_dir.join(format!("{}.csv", product_id));
        write_file(&path, &summary_csv(&product_id, &timestamp, &report, aggregated))?;
        Some(path)
    } else {
        None
    };

    info!(
        product_id = %product_id,
        confidence = report.confidence,
        json = %json_path.display(),
        csv = csv_path.is_some(),
        "Product result exported"
    );

    Ok(ExportPaths {
        product_id,
        json: json_path,
        csv: csv_path,
    })
}

/// Product ids become file names, so they must be a single path component
fn validate_product_id(id: &str) -> AnalysisResult<String> {
    let id = id.trim();
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\'])
        || id.chars().any(char::is_control);
    if invalid {
        return Err(AnalysisError::InvalidInput(format!(
            "product id '{}' is not usable as a file name",
            id
        )));
    }
    Ok(id.to_string())
}

fn write_file(path: &Path, content: &str) -> AnalysisResult<()> {
    fs::write(path, content)
        .map_err(|e| AnalysisError::Export(format!("cannot write {}: {}", path.display(), e)))
}

/// Header and single data row of the summary CSV
fn summary_csv(product_id: &str, timestamp: &str, report: &ConfidenceReport, aggregated: &Value) -> String {
    let mut header: Vec<String> = [
        "product_id",
        "timestamp",
        "confidence",
        "confidence_notes",
        "score_mean",
        "score_median",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let score_summary = aggregated.get("score_summary");
    let mut row = vec![
        product_id.to_string(),
        timestamp.to_string(),
        format!("{:.3}", report.confidence),
        report.notes.join(" | "),
        csv_scalar(score_summary.and_then(|s| s.get("mean"))),
        csv_scalar(score_summary.and_then(|s| s.get("median"))),
    ];

    if let Some(consensus) = aggregated.get("visual_consensus").and_then(Value::as_object) {
        let mut dimensions: Vec<&String> = consensus.keys().collect();
        dimensions.sort();

        for dimension in dimensions {
            let info = &consensus[dimension.as_str()];
            header.push(format!("{}_mean", dimension));
            header.push(format!("{}_confidence", dimension));
            header.push(format!("{}_disagreement", dimension));

            let disagreement = info.get("disagreement").and_then(Value::as_bool).unwrap_or(false);
            row.push(csv_scalar(info.get("mean")));
            row.push(csv_scalar(info.get("confidence")));
            row.push(disagreement.to_string());
        }
    }

    format!("{}\r\n{}\r\n", csv_line(&header), csv_line(&row))
}

/// Plain text for a JSON scalar; null or missing is an empty cell
fn csv_scalar(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// One CSV record, quoting fields per RFC 4180
fn csv_line(fields: &[String]) -> String {
    fields
        .iter()
        .map(|field| {
            if field.contains([',', '"', '\r', '\n']) {
                format!("\"{}\"", field.replace('"', "\"\""))
            } else {
                field.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

//! Integration tests for product result export

use pvac_ai::aggregation::aggregate;
use pvac_ai::export::{export_product_result, export_product_value, ExportOptions};
use serde_json::{json, Map, Value};
use std::fs;
use tempfile::TempDir;

fn sample_batch() -> Vec<Value> {
    vec![
        json!({
            "visual_measurements": {
                "formality": {"score": 2.0, "justification": "tailored", "uncertain": false},
                "visual_weight": {"score": -1.0, "justification": "thin", "uncertain": false}
            },
            "attributes": {"transparency": "opaque"}
        }),
        json!({
            "visual_measurements": {
                "formality": {"score": 3.0, "justification": "tailored", "uncertain": false}
            },
            "attributes": {"transparency": "opaque"}
        }),
    ]
}

fn options(dir: &TempDir, product_id: Option<&str>) -> ExportOptions {
    ExportOptions {
        product_id: product_id.map(str::to_string),
        output_dir: dir.path().join("out"),
        ..Default::default()
    }
}

fn read_json(path: &std::path::Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_json_document_structure() {
    let dir = TempDir::new().unwrap();
    let mut metadata = Map::new();
    metadata.insert("sku".to_string(), json!("GL-42"));
    let opts = ExportOptions {
        metadata,
        ..options(&dir, Some("sku-42"))
    };

    let aggregated = aggregate(&sample_batch());
    let paths = export_product_result(&aggregated, &opts).unwrap();

    assert_eq!(paths.product_id, "sku-42");
    assert_eq!(paths.json, dir.path().join("out").join("sku-42.json"));
    assert!(paths.csv.is_none());

    let document = read_json(&paths.json);
    assert_eq!(document["product_id"], "sku-42");
    assert_eq!(document["metadata"]["sku"], "GL-42");
    assert!(chrono::DateTime::parse_from_rfc3339(document["timestamp"].as_str().unwrap()).is_ok());

    // mean(1.0, 0.5), no disputes
    assert_eq!(document["confidence"], json!(0.75));
    assert_eq!(
        document["confidence_notes"][0],
        "visual_consensus mean confidence: 0.750"
    );
    assert_eq!(document["result"]["visual_consensus"]["formality"]["mean"], json!(2.5));
    assert_eq!(
        document["result"]["attribute_summary"]["transparency"]["value"],
        "opaque"
    );
    assert_eq!(document["result"]["raw"].as_array().unwrap().len(), 2);
}

#[test]
fn test_csv_summary_row() {
    let dir = TempDir::new().unwrap();
    let opts = ExportOptions {
        as_csv: true,
        ..options(&dir, Some("sku-7"))
    };

    let paths = export_product_result(&aggregate(&sample_batch()), &opts).unwrap();
    let csv_path = paths.csv.expect("csv path");
    assert_eq!(csv_path, dir.path().join("out").join("sku-7.csv"));

    let content = fs::read_to_string(&csv_path).unwrap();
    assert!(content.ends_with("\r\n"));

    let lines: Vec<&str> = content.split("\r\n").filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(
        lines[0],
        "product_id,timestamp,confidence,confidence_notes,score_mean,score_median,\
         formality_mean,formality_confidence,formality_disagreement,\
         visual_weight_mean,visual_weight_confidence,visual_weight_disagreement"
    );
    assert!(lines[1].starts_with("sku-7,"));
    assert!(lines[1].contains(",0.750,"));
    assert!(lines[1].ends_with(",2.5,1.0,false,-1.0,0.5,false"));
}

#[test]
fn test_random_product_id_when_omitted() {
    let dir = TempDir::new().unwrap();
    let paths = export_product_result(&aggregate(&[]), &options(&dir, None)).unwrap();

    assert!(uuid::Uuid::parse_str(&paths.product_id).is_ok());
    assert!(paths.json.exists());

    let document = read_json(&paths.json);
    assert_eq!(document["product_id"], json!(paths.product_id));
    // Nothing observed, nothing to deduct
    assert_eq!(document["confidence"], json!(1.0));
    assert_eq!(
        document["confidence_notes"],
        json!(["no notable disagreements or missing values"])
    );
}

#[test]
fn test_legacy_shape_export() {
    let dir = TempDir::new().unwrap();
    let legacy = json!({
        "score_summary": {"count": 3, "missing": 1, "mean": 0.4, "median": 0.5},
        "attribute_disagreements": ["color"],
        "score_disagreements": 1
    });
    let opts = ExportOptions {
        as_csv: true,
        ..options(&dir, Some("legacy"))
    };

    let paths = export_product_value(&legacy, &opts).unwrap();
    let document = read_json(&paths.json);

    // 1.0 - 0.2 * 0.25 - 0.1 - 0.15
    let confidence = document["confidence"].as_f64().unwrap();
    assert!((confidence - 0.7).abs() < 1e-9);
    let notes: Vec<&str> = document["confidence_notes"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(notes.contains(&"1 of 4 images missing numeric scores"));
    assert!(notes.contains(&"score disagreements: 1 outlier(s)"));

    let csv = fs::read_to_string(paths.csv.unwrap()).unwrap();
    let row = csv.split("\r\n").nth(1).unwrap();
    assert!(row.ends_with(",0.4,0.5"));
}

#[test]
fn test_invalid_product_id_rejected() {
    let dir = TempDir::new().unwrap();
    let result = export_product_result(&aggregate(&[]), &options(&dir, Some("../escape")));
    assert!(result.is_err());
    assert!(!dir.path().join("escape.json").exists());
}

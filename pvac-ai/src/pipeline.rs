//! Per-image analysis pipeline and batch driver
//!
//! One image flows through: cache lookup → vision call → forbidden field
//! check → measurement/attribute normalization → required dimension check →
//! final validation → cache store. Any failure becomes an error record with
//! the failing stage; it never aborts the batch.

use crate::aggregation::consensus::aggregate;
use crate::cache::ResultCache;
use crate::error::{AnalysisError, AnalysisResult};
use crate::normalize::{measurements::strip_diagnostics, parse_attributes, parse_measurements};
use crate::prompts::PromptSet;
use crate::schema::{validate_image_analysis, REQUIRED_DIMENSIONS};
use crate::types::{records_to_values, AggregationResult, ImageRef, PerImageRecord, RecordError};
use crate::vision::{analyze_image, VisionClient};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of images analyzed concurrently
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Top-level fields that would indicate physical measurement
pub const FORBIDDEN_PHYSICAL_FIELDS: [&str; 4] = ["width_mm", "height_mm", "area_mm2", "unit"];

/// Stage names recorded on error records
pub mod stage {
    pub const ANALYSIS: &str = "analysis";
    pub const FORBIDDEN_PHYSICAL_MEASUREMENT: &str = "forbidden_physical_measurement";
    pub const VISUAL_MEASUREMENTS: &str = "visual_measurements";
    pub const PARSE_MEASUREMENTS: &str = "parse_measurements";
    pub const PARSE_ATTRIBUTES: &str = "parse_attributes";
    pub const FINAL_VALIDATION: &str = "final_validation";
    pub const ASYNC_CANCELLED: &str = "async_cancelled";
    pub const ASYNC_EXECUTION: &str = "async_execution";
}

/// Run the single-image pipeline
///
/// Returns either a validated record (also stored in `cache`) or an error
/// record naming the failing stage.
pub async fn process_single_image(
    image: &ImageRef,
    prompts: &PromptSet,
    client: &dyn VisionClient,
    cache: Option<&ResultCache>,
) -> PerImageRecord {
    if let Some(cached) = cache.and_then(|c| c.get(&image.id)) {
        debug!("Using cached result for {}", image.id);
        return cached;
    }

    let raw = match analyze_image(client, image, prompts).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Analysis failed for {}: {}", image.id, e);
            return PerImageRecord::failed(&image.id, stage::ANALYSIS, e);
        }
    };

    if let Err(e) = check_forbidden_fields(&raw) {
        warn!("Image {} rejected: {}", image.id, e);
        return PerImageRecord::failed(&image.id, stage::FORBIDDEN_PHYSICAL_MEASUREMENT, e);
    }

    let Some(raw_measurements) = raw.get("visual_measurements") else {
        return PerImageRecord::failed(
            &image.id,
            stage::VISUAL_MEASUREMENTS,
            "expected a 'visual_measurements' field in the analysis",
        );
    };

    let mut errors = Vec::new();

    let measurements = match parse_measurements(raw_measurements) {
        Ok(parsed) => strip_diagnostics(parsed),
        Err(e) => {
            errors.push(RecordError {
                stage: stage::PARSE_MEASUREMENTS.to_string(),
                error: e.to_string(),
            });
            Default::default()
        }
    };

    let attributes = match raw.get("attributes") {
        None => Default::default(),
        Some(raw_attributes) => match parse_attributes(raw_attributes) {
            Ok(attributes) => attributes,
            Err(e) => {
                errors.push(RecordError {
                    stage: stage::PARSE_ATTRIBUTES.to_string(),
                    error: e.to_string(),
                });
                return error_record(&image.id, errors);
            }
        },
    };

    let missing: Vec<&str> = REQUIRED_DIMENSIONS
        .iter()
        .copied()
        .filter(|d| !measurements.contains_key(*d))
        .collect();
    if !missing.is_empty() {
        errors.push(RecordError {
            stage: stage::VISUAL_MEASUREMENTS.to_string(),
            error: format!("missing required visual measurement dimensions: {:?}", missing),
        });
        return error_record(&image.id, errors);
    }

    let confidence_notes = match raw.get("confidence_notes") {
        Some(Value::String(notes)) => Some(notes.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };

    let mut record = PerImageRecord {
        image_id: image.id.clone(),
        visual_measurements: Some(measurements),
        attributes: Some(attributes),
        confidence_notes,
        errors: Vec::new(),
    };

    match validate_image_analysis(&record.to_value()) {
        Ok(analysis) => {
            record.image_id = analysis.image_id;
            record.confidence_notes = analysis.confidence_notes;
            if let Some(cache) = cache {
                cache.set(image.id.clone(), record.clone());
            }
            debug!("Image {} validated", image.id);
            record
        }
        Err(e) => {
            warn!("Final validation failed for {}: {}", image.id, e);
            errors.push(RecordError {
                stage: stage::FINAL_VALIDATION.to_string(),
                error: e.to_string(),
            });
            error_record(&image.id, errors)
        }
    }
}

/// Reject model output that reports physical measurements
pub fn check_forbidden_fields(raw: &Map<String, Value>) -> AnalysisResult<()> {
    let forbidden: Vec<&str> = FORBIDDEN_PHYSICAL_FIELDS
        .iter()
        .copied()
        .filter(|f| raw.contains_key(*f))
        .collect();
    if forbidden.is_empty() {
        return Ok(());
    }
    Err(AnalysisError::Forbidden(format!(
        "physical measurement fields are not allowed: {:?}",
        forbidden
    )))
}

fn error_record(image_id: &str, errors: Vec<RecordError>) -> PerImageRecord {
    PerImageRecord {
        image_id: image_id.to_string(),
        visual_measurements: None,
        attributes: None,
        confidence_notes: None,
        errors,
    }
}

/// Analyze many images with bounded concurrency
///
/// Results come back in input order, one record per image. Each image runs
/// in its own task, so a panic in one becomes an `async_execution` error
/// record. Images not yet started when `cancel` fires become
/// `async_cancelled` records. A `concurrency` of 0 uses
/// [`DEFAULT_CONCURRENCY`].
pub async fn process_images(
    images: &[ImageRef],
    prompts: &PromptSet,
    client: Arc<dyn VisionClient>,
    cache: Option<Arc<ResultCache>>,
    concurrency: usize,
    cancel: Option<CancellationToken>,
) -> Vec<PerImageRecord> {
    let limit = if concurrency == 0 { DEFAULT_CONCURRENCY } else { concurrency };
    let total = images.len();

    info!(
        images = total,
        concurrency = limit,
        provider = client.provider(),
        "Processing images"
    );

    let records: Vec<PerImageRecord> = stream::iter(images.iter().cloned())
        .map(|image| {
            let client = Arc::clone(&client);
            let cache = cache.clone();
            let cancel = cancel.clone();
            let prompts = prompts.clone();

            async move {
                if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                    debug!("Skipping {}: cancelled before start", image.id);
                    return PerImageRecord::failed(&image.id, stage::ASYNC_CANCELLED, "task cancelled");
                }

                let image_id = image.id.clone();
                let task = tokio::spawn(async move {
                    process_single_image(&image, &prompts, client.as_ref(), cache.as_deref()).await
                });

                match task.await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!("Task for {} failed: {}", image_id, e);
                        PerImageRecord::failed(&image_id, stage::ASYNC_EXECUTION, e)
                    }
                }
            }
        })
        .buffered(limit)
        .collect()
        .await;

    let failed = records.iter().filter(|r| r.is_error()).count();
    info!(
        images = total,
        succeeded = total - failed,
        failed,
        "Image processing complete"
    );

    records
}

/// Per-image records plus their product-level aggregation
#[derive(Debug, Clone)]
pub struct ProductAnalysis {
    pub records: Vec<PerImageRecord>,
    pub aggregation: AggregationResult,
}

/// Process a product's images and aggregate the results
pub async fn analyze_product(
    images: &[ImageRef],
    prompts: &PromptSet,
    client: Arc<dyn VisionClient>,
    cache: Option<Arc<ResultCache>>,
    concurrency: usize,
    cancel: Option<CancellationToken>,
) -> ProductAnalysis {
    let records = process_images(images, prompts, client, cache.clone(), concurrency, cancel).await;
    let aggregation = aggregate(&records_to_values(&records));

    if let Some(cache) = cache {
        let stats = cache.stats();
        info!(hits = stats.hits, misses = stats.misses, "Cache statistics");
    }

    ProductAnalysis {
        records,
        aggregation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeValue, SourceKind};
    use crate::vision::{MockVisionClient, VisionResponse};
    use async_trait::async_trait;
    use serde_json::json;

    struct FixedClient(Value);

    #[async_trait]
    impl VisionClient for FixedClient {
        fn provider(&self) -> &'static str {
            "fixed"
        }

        async fn infer(&self, _: &ImageRef, _: &PromptSet) -> anyhow::Result<VisionResponse> {
            Ok(VisionResponse::Json(self.0.clone()))
        }
    }

    fn image(id: &str) -> ImageRef {
        ImageRef {
            id: id.to_string(),
            source: format!("https://example.com/{}.jpg", id),
            kind: SourceKind::Url,
        }
    }

    #[tokio::test]
    async fn test_mock_payload_passes_pipeline() {
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &MockVisionClient::new(),
            None,
        )
        .await;

        assert!(!record.is_error(), "{:?}", record.errors);
        let attributes = record.attributes.unwrap();
        assert_eq!(attributes["frame_geometry"], AttributeValue::from("rectangle"));
        assert_eq!(
            record.visual_measurements.unwrap()["visual_weight"].score,
            Some(-1.0)
        );
    }

    #[tokio::test]
    async fn test_forbidden_fields_rejected() {
        let mut payload = MockVisionClient::payload();
        payload["width_mm"] = json!(140);
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(payload),
            None,
        )
        .await;

        assert_eq!(record.errors[0].stage, stage::FORBIDDEN_PHYSICAL_MEASUREMENT);
        assert!(record.errors[0].error.starts_with("Forbidden fields:"));
        assert!(record.errors[0].error.contains("width_mm"));
        assert!(record.visual_measurements.is_none());
    }

    #[test]
    fn test_check_forbidden_fields() {
        let clean = MockVisionClient::payload();
        assert!(check_forbidden_fields(clean.as_object().unwrap()).is_ok());

        let mut flagged = clean;
        flagged["unit"] = json!("mm");
        flagged["area_mm2"] = json!(1200);
        match check_forbidden_fields(flagged.as_object().unwrap()) {
            Err(AnalysisError::Forbidden(msg)) => {
                assert!(msg.contains("area_mm2"));
                assert!(msg.contains("unit"));
            }
            other => panic!("expected Forbidden, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_measurements_block() {
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(json!({"attributes": {}})),
            None,
        )
        .await;
        assert_eq!(record.errors[0].stage, stage::VISUAL_MEASUREMENTS);
    }

    #[tokio::test]
    async fn test_missing_dimension_recorded() {
        let mut payload = MockVisionClient::payload();
        payload["visual_measurements"]
            .as_object_mut()
            .unwrap()
            .remove("formality");
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(payload),
            None,
        )
        .await;

        assert_eq!(record.errors.len(), 1);
        assert_eq!(record.errors[0].stage, stage::VISUAL_MEASUREMENTS);
        assert!(record.errors[0].error.contains("formality"));
    }

    #[tokio::test]
    async fn test_unscorable_dimension_fails_final_validation() {
        let mut payload = MockVisionClient::payload();
        payload["visual_measurements"]["formality"]["score"] = json!("unclear");
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(payload),
            None,
        )
        .await;
        assert_eq!(record.errors[0].stage, stage::FINAL_VALIDATION);
    }

    #[tokio::test]
    async fn test_non_object_attributes_rejected() {
        let mut payload = MockVisionClient::payload();
        payload["attributes"] = json!(["black"]);
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(payload),
            None,
        )
        .await;
        assert_eq!(record.errors[0].stage, stage::PARSE_ATTRIBUTES);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_clamped_then_valid() {
        let mut payload = MockVisionClient::payload();
        payload["visual_measurements"]["embellishment"]["score"] = json!(9.5);
        let record = process_single_image(
            &image("a"),
            &PromptSet::standard(),
            &FixedClient(payload),
            None,
        )
        .await;

        assert!(!record.is_error());
        assert_eq!(
            record.visual_measurements.unwrap()["embellishment"].score,
            Some(5.0)
        );
    }

    #[tokio::test]
    async fn test_cancelled_batch_yields_cancelled_records() {
        let token = CancellationToken::new();
        token.cancel();

        let records = process_images(
            &[image("a"), image("b")],
            &PromptSet::standard(),
            Arc::new(MockVisionClient::new()),
            None,
            2,
            Some(token),
        )
        .await;

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.errors[0].stage == stage::ASYNC_CANCELLED));
    }
}

//! Deterministic offline vision client
//!
//! Returns a fixed, schema-conformant analysis for every image. Used for
//! local runs without API keys and throughout the tests.

use super::{VisionClient, VisionResponse};
use crate::prompts::PromptSet;
use crate::types::ImageRef;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Mock vision client
#[derive(Debug, Default)]
pub struct MockVisionClient {
    /// Return the payload as a JSON string instead of structured JSON
    as_json_string: bool,
    /// Number of `infer` calls served
    calls: AtomicUsize,
}

impl MockVisionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json_string(mut self, as_json_string: bool) -> Self {
        self.as_json_string = as_json_string;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The fixed analysis payload
    pub fn payload() -> Value {
        json!({
            "visual_measurements": {
                "gender_expression": {
                    "score": 0.5,
                    "justification": "Neutral frame styling",
                    "uncertain": false
                },
                "visual_weight": {
                    "score": -1.0,
                    "justification": "Thin frame, little material",
                    "uncertain": false
                },
                "embellishment": {
                    "score": -2.0,
                    "justification": "No decorative elements",
                    "uncertain": false
                },
                "unconventionality": {
                    "score": -1.5,
                    "justification": "Classic rectangular shape",
                    "uncertain": false
                },
                "formality": {
                    "score": 0.0,
                    "justification": "Neither formal nor casual",
                    "uncertain": false
                }
            },
            "attributes": {
                "frame_geometry": "rectangular",
                "transparency": "opaque",
                "dominant_colors": ["black"],
                "visible_texture": "smooth",
                "visible_wirecore": "uncertain",
                "suitable_for_kids": "uncertain"
            },
            "confidence_notes": "Clear frontal view, even lighting"
        })
    }
}

#[async_trait]
impl VisionClient for MockVisionClient {
    fn provider(&self) -> &'static str {
        "mock"
    }

    async fn infer(&self, _image: &ImageRef, _prompts: &PromptSet) -> anyhow::Result<VisionResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let payload = Self::payload();
        if self.as_json_string {
            Ok(VisionResponse::Text(serde_json::to_string(&payload)?))
        } else {
            Ok(VisionResponse::Json(payload))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::REQUIRED_DIMENSIONS;
    use crate::types::SourceKind;

    #[tokio::test]
    async fn test_mock_counts_calls_and_returns_payload() {
        let client = MockVisionClient::new();
        let image = ImageRef {
            id: "x".into(),
            source: "/tmp/x.jpg".into(),
            kind: SourceKind::Local,
        };

        let response = client.infer(&image, &PromptSet::standard()).await.unwrap();
        assert_eq!(client.calls(), 1);

        let VisionResponse::Json(value) = response else {
            panic!("expected structured JSON");
        };
        for dimension in REQUIRED_DIMENSIONS {
            assert!(value["visual_measurements"].get(dimension).is_some());
        }
    }
}

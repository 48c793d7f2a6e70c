// Gemini Vision Client
//
// generateContent REST call. Images are always sent inline: URL images are
// downloaded first, local images read from disk, then base64-encoded with a
// sniffed MIME type.

use super::{load_image_bytes, VisionClient, VisionResponse};
use crate::error::{AnalysisError, AnalysisResult};
use crate::prompts::PromptSet;
use crate::types::ImageRef;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::Engine as _;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// API base URL
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Requests per second allowed by the client-side limiter
const REQUESTS_PER_SECOND: u32 = 5;

/// Output rules appended to the task prompt
const STRICT_OUTPUT_RULES: &str = "\
STRICT OUTPUT RULES:
- Return ONLY valid JSON
- No markdown
- No explanations
- Scores must be between -5.0 and +5.0";

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first candidate
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
            .unwrap_or_default()
    }
}

/// Gemini vision client
pub struct GeminiVisionClient {
    client: Client,
    api_key: String,
    model: String,
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl GeminiVisionClient {
    /// Create a client; `model` defaults to [`DEFAULT_GEMINI_MODEL`]
    ///
    /// A `models/` prefix on the model name is accepted and stripped.
    pub fn new(api_key: String, model: Option<String>) -> AnalysisResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AnalysisError::InvalidInput("Gemini API key is required".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::Vision(format!("failed to build HTTP client: {}", e)))?;

        let model = model.unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let model = model.strip_prefix("models/").unwrap_or(&model).to_string();
        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            api_key,
            model,
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", GEMINI_API_BASE, self.model)
    }
}

#[async_trait]
impl VisionClient for GeminiVisionClient {
    fn provider(&self) -> &'static str {
        "gemini"
    }

    async fn infer(&self, image: &ImageRef, prompts: &PromptSet) -> anyhow::Result<VisionResponse> {
        let (bytes, mime) = load_image_bytes(&self.client, image).await?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let body = json!({
            "systemInstruction": {"parts": [{"text": prompts.system}]},
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": format!("{}\n\n{}", prompts.task, STRICT_OUTPUT_RULES)},
                    {"inline_data": {"mime_type": mime, "data": encoded}}
                ]
            }]
        });

        self.rate_limiter.until_ready().await;
        debug!(
            "Gemini request: model={}, image={}, {} bytes ({})",
            self.model,
            image.id,
            bytes.len(),
            mime
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Gemini returned {}: {}", status, detail));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .context("failed to parse Gemini response")?;

        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(anyhow!("Gemini response contained no text"));
        }

        Ok(VisionResponse::Text(text.trim().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_prefix_stripped() {
        let client = GeminiVisionClient::new("key".into(), Some("models/gemini-2.5-pro".into())).unwrap();
        assert_eq!(client.model(), "gemini-2.5-pro");
        assert!(client.endpoint().ends_with("/models/gemini-2.5-pro:generateContent"));

        let client = GeminiVisionClient::new("key".into(), None).unwrap();
        assert_eq!(client.model(), DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_empty_key_rejected() {
        assert!(GeminiVisionClient::new("  ".into(), None).is_err());
    }

    #[test]
    fn test_candidate_text() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{"content": {"parts": [{"text": "{\"x\": "}, {"text": "1}"}]}}]
        }))
        .unwrap();
        assert_eq!(body.text(), "{\"x\": 1}");

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty.text(), "");
    }
}

// OpenAI Vision Client
//
// Responses API (POST /v1/responses) with one system message and one user
// message carrying the task prompt plus the image. URL images are passed by
// reference; local images are sent inline as base64 data URLs.

use super::{load_image_bytes, VisionClient, VisionResponse};
use crate::error::{AnalysisError, AnalysisResult};
use crate::prompts::PromptSet;
use crate::types::{ImageRef, SourceKind};
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

/// Responses API endpoint
const OPENAI_RESPONSES_URL: &str = "https://api.openai.com/v1/responses";

/// Default model
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Requests per second allowed by the client-side limiter
const REQUESTS_PER_SECOND: u32 = 5;

#[derive(Debug, Deserialize)]
struct ResponsesBody {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesBody {
    /// Concatenated `output_text` parts of all output messages
    fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|item| item.content.iter())
            .filter(|c| c.kind == "output_text")
            .filter_map(|c| c.text.as_deref())
            .collect()
    }
}

/// OpenAI vision client
pub struct OpenAiVisionClient {
    client: Client,
    api_key: String,
    model: String,
    /// Client-side rate limiter shared by all concurrent calls
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl OpenAiVisionClient {
    /// Create a client; `model` defaults to [`DEFAULT_OPENAI_MODEL`]
    pub fn new(api_key: String, model: Option<String>) -> AnalysisResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AnalysisError::Vision(format!("failed to build HTTP client: {}", e)))?;

        let per_second = NonZeroU32::new(REQUESTS_PER_SECOND).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            rate_limiter: RateLimiter::direct(Quota::per_second(per_second)),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Image reference accepted by `input_image`
    async fn image_url(&self, image: &ImageRef) -> anyhow::Result<String> {
        match image.kind {
            SourceKind::Url => Ok(image.source.clone()),
            SourceKind::Local => {
                let (bytes, mime) = load_image_bytes(&self.client, image).await?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(format!("data:{};base64,{}", mime, encoded))
            }
        }
    }
}

#[async_trait]
impl VisionClient for OpenAiVisionClient {
    fn provider(&self) -> &'static str {
        "openai"
    }

    async fn infer(&self, image: &ImageRef, prompts: &PromptSet) -> anyhow::Result<VisionResponse> {
        let image_url = self.image_url(image).await?;

        let body = json!({
            "model": self.model,
            "input": [
                {"role": "system", "content": prompts.system},
                {
                    "role": "user",
                    "content": [
                        {"type": "input_text", "text": prompts.task},
                        {"type": "input_image", "image_url": image_url}
                    ]
                }
            ]
        });

        self.rate_limiter.until_ready().await;
        debug!("OpenAI request: model={}, image={}", self.model, image.id);

        let response = self
            .client
            .post(OPENAI_RESPONSES_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("OpenAI request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI returned {}: {}", status, detail));
        }

        let parsed: ResponsesBody = response
            .json()
            .await
            .context("failed to parse OpenAI response")?;

        let text = parsed.output_text();
        if text.trim().is_empty() {
            return Err(anyhow!("OpenAI response contained no output text"));
        }

        Ok(VisionResponse::Text(text))
    }
}

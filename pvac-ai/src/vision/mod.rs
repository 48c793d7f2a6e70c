//! Vision backends
//!
//! A [`VisionClient`] turns one image plus prompts into raw model output.
//! [`analyze_image`] is the single entry point the pipeline uses; it
//! accepts structured JSON directly or recovers a JSON object from text.

pub mod gemini;
pub mod mock;
pub mod openai;

pub use gemini::GeminiVisionClient;
pub use mock::MockVisionClient;
pub use openai::OpenAiVisionClient;

use crate::error::{AnalysisError, AnalysisResult};
use crate::input::image_mime_type;
use crate::prompts::PromptSet;
use crate::types::{ImageRef, SourceKind};
use anyhow::Context;
use async_trait::async_trait;
use pvac_common::config::TomlConfig;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw output of a vision call
#[derive(Debug, Clone, PartialEq)]
pub enum VisionResponse {
    /// Structured JSON returned by the client
    Json(Value),
    /// Text that should contain a JSON object
    Text(String),
}

/// Vision-capable model backend
#[async_trait]
pub trait VisionClient: Send + Sync {
    /// Short provider name for logs
    fn provider(&self) -> &'static str;

    /// Run one analysis call for a single image
    async fn infer(&self, image: &ImageRef, prompts: &PromptSet) -> anyhow::Result<VisionResponse>;
}

/// Available vision providers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Mock,
    OpenAi,
    Gemini,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mock => "mock",
            Provider::OpenAi => "openai",
            Provider::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(Provider::Mock),
            "openai" => Ok(Provider::OpenAi),
            "gemini" => Ok(Provider::Gemini),
            other => Err(AnalysisError::InvalidInput(format!(
                "unknown vision provider '{}' (expected mock, openai or gemini)",
                other
            ))),
        }
    }
}

/// Build a vision client for `provider`
///
/// `model` overrides the model configured in TOML. Real providers need an
/// API key (see [`crate::config`]).
pub fn build_client(
    provider: Provider,
    model: Option<String>,
    toml_config: &TomlConfig,
) -> AnalysisResult<Arc<dyn VisionClient>> {
    let client: Arc<dyn VisionClient> = match provider {
        Provider::Mock => Arc::new(MockVisionClient::new()),
        Provider::OpenAi => {
            let key = crate::config::resolve_openai_api_key(toml_config)?;
            let model = model.or_else(|| toml_config.openai.model.clone());
            Arc::new(OpenAiVisionClient::new(key, model)?)
        }
        Provider::Gemini => {
            let key = crate::config::resolve_gemini_api_key(toml_config)?;
            let model = model.or_else(|| toml_config.gemini.model.clone());
            Arc::new(GeminiVisionClient::new(key, model)?)
        }
    };

    info!("Vision provider: {}", client.provider());
    Ok(client)
}

/// Analyze a single image and return the model's JSON object
///
/// # Errors
/// - `Vision` when the client call fails
/// - `Parse` when the response holds no JSON object
pub async fn analyze_image(
    client: &dyn VisionClient,
    image: &ImageRef,
    prompts: &PromptSet,
) -> AnalysisResult<Map<String, Value>> {
    debug!("Analyzing image {} via {}", image.id, client.provider());

    let response = client
        .infer(image, prompts)
        .await
        .map_err(|e| AnalysisError::Vision(format!("{:#}", e)))?;

    parse_response(response)
}

/// Turn a raw response into a JSON object
pub fn parse_response(response: VisionResponse) -> AnalysisResult<Map<String, Value>> {
    let value = match response {
        VisionResponse::Json(value) => value,
        VisionResponse::Text(text) => parse_json_text(&text)?,
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(AnalysisError::Parse(format!(
            "vision response is not a JSON object (got {})",
            json_kind(&other)
        ))),
    }
}

/// Parse text as JSON, recovering the outermost `{...}` span on failure
fn parse_json_text(text: &str) -> AnalysisResult<Value> {
    let text = text.trim();
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    // Models sometimes wrap JSON in prose or markdown fences
    let span = text
        .find('{')
        .zip(text.rfind('}'))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &text[start..=end]);

    match span {
        Some(candidate) => serde_json::from_str(candidate).map_err(|e| {
            AnalysisError::Parse(format!("vision response is not valid JSON: {}", e))
        }),
        None => Err(AnalysisError::Parse(format!(
            "vision response contains no JSON object: {}",
            truncate(text, 200)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Image bytes and MIME type, fetched (URL) or read (local)
pub(crate) async fn load_image_bytes(
    http: &reqwest::Client,
    image: &ImageRef,
) -> anyhow::Result<(Vec<u8>, &'static str)> {
    let bytes = match image.kind {
        SourceKind::Url => {
            let response = http
                .get(&image.source)
                .send()
                .await
                .with_context(|| format!("failed to download {}", image.source))?
                .error_for_status()
                .with_context(|| format!("download of {} failed", image.source))?;
            response.bytes().await?.to_vec()
        }
        SourceKind::Local => tokio::fs::read(&image.source)
            .await
            .with_context(|| format!("failed to read {}", image.source))?,
    };

    let mime = image_mime_type(&bytes, &image.source);
    Ok((bytes, mime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_response_accepts_object() {
        let map = parse_response(VisionResponse::Json(json!({"a": 1}))).unwrap();
        assert_eq!(map["a"], 1);
    }

    #[test]
    fn test_parse_response_recovers_fenced_json() {
        let text = "Here you go:\n```json\n{\"visual_measurements\": {}}\n```";
        let map = parse_response(VisionResponse::Text(text.to_string())).unwrap();
        assert!(map.contains_key("visual_measurements"));
    }

    #[test]
    fn test_parse_response_rejects_non_objects() {
        assert!(matches!(
            parse_response(VisionResponse::Json(json!([1, 2]))),
            Err(AnalysisError::Parse(_))
        ));
        assert!(matches!(
            parse_response(VisionResponse::Text("\"just a string\"".into())),
            Err(AnalysisError::Parse(_))
        ));
        assert!(matches!(
            parse_response(VisionResponse::Text("no json here".into())),
            Err(AnalysisError::Parse(_))
        ));
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" gemini ".parse::<Provider>().unwrap(), Provider::Gemini);
        assert_eq!(Provider::Mock.to_string(), "mock");
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_build_mock_client() {
        let client = build_client(Provider::Mock, None, &TomlConfig::default()).unwrap();
        assert_eq!(client.provider(), "mock");
    }

    #[tokio::test]
    async fn test_analyze_image_with_text_mock() {
        let client = MockVisionClient::new().with_json_string(true);
        let image = ImageRef {
            id: "img".into(),
            source: "https://example.com/a.jpg".into(),
            kind: SourceKind::Url,
        };

        let map = analyze_image(&client, &image, &PromptSet::standard())
            .await
            .unwrap();
        assert!(map.contains_key("attributes"));
    }
}

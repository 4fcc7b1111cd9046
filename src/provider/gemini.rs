use base64::Engine;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::{GeneratedImage, GenerationRequest, ImageProvider};
use crate::error::{GenError, ProviderError};
use crate::types::ReferenceImage;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-image-preview";

/// The API does not report dimensions; generated images are square 1024.
const ASSUMED_SIZE: u32 = 1024;

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Connection settings for [`GeminiProvider`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Per-request deadline; expiry surfaces as a provider failure.
    pub timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: normalize(base_url.into()),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `NANO_BANANA_API_KEY`, `NANO_BANANA_BASE_URL` and optional `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self, GenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, GenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = ["NANO_BANANA_API_KEY", "NANO_BANANA_BASE_URL"];
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|key| lookup(*key).map_or(true, |v| v.is_empty()))
            .collect();
        if !missing.is_empty() {
            return Err(GenError::InvalidConfig(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let mut config = Self::new(
            lookup("NANO_BANANA_API_KEY").unwrap_or_default(),
            lookup("NANO_BANANA_BASE_URL").unwrap_or_default(),
        );
        if let Some(model) = lookup("GEMINI_MODEL").filter(|m| !m.is_empty()) {
            config = config.with_model(model);
        }
        Ok(config)
    }

    pub fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Build the `generateContent` request body: the prompt, plus the
/// reference image as inline data when present.
pub fn build_request_body(prompt: &str, reference: Option<&ReferenceImage>) -> Value {
    let mut parts = vec![json!({ "text": prompt })];
    if let Some(img) = reference {
        parts.push(json!({
            "inlineData": {
                "mimeType": img.mime_type,
                "data": img.base64_data,
            }
        }));
    }
    json!({ "contents": [{ "parts": parts }] })
}

/// Extract the first inline image from a `generateContent` response.
/// Returns `(bytes, mime_type)`.
pub fn parse_response(json: &Value) -> Result<(Vec<u8>, String), ProviderError> {
    let candidates = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("Gemini API returned empty candidates".into())
        })?;

    let inline = candidates[0]
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .and_then(|parts| parts.iter().find_map(|part| part.get("inlineData")))
        .ok_or_else(|| {
            ProviderError::InvalidResponse("No image data in Gemini response".into())
        })?;

    let data = inline
        .get("data")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("No image data in Gemini response".into())
        })?;
    let mime_type = inline
        .get("mimeType")
        .and_then(|m| m.as_str())
        .unwrap_or("image/png")
        .to_string();

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.as_bytes())
        .map_err(|e| {
            ProviderError::InvalidResponse(format!("Gemini image data is not valid base64: {}", e))
        })?;

    Ok((bytes, mime_type))
}

/// Provider calling Google's Gemini image model over HTTPS.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    http: Client,
    config: GeminiConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }
}

impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        let url = self.config.endpoint();
        let body = build_request_body(&request.prompt, request.reference.as_ref());

        debug!(
            seed = request.seed,
            image_to_image = request.reference.is_some(),
            "Calling Gemini generateContent"
        );

        let resp = self
            .http
            .post(&url)
            .timeout(self.config.timeout)
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Network {
                        context: format!("Cannot reach Gemini API at {}", self.config.base_url),
                        source: e,
                    }
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body_text = resp.text().await.unwrap_or_default();
            warn!(status, "Gemini API returned an error status");
            return Err(ProviderError::Http {
                status,
                body: body_text,
            });
        }

        let json: Value = resp.json().await.map_err(|e| ProviderError::Network {
            context: "Failed to parse Gemini response".into(),
            source: e,
        })?;

        let (bytes, mime_type) = parse_response(&json)?;

        Ok(GeneratedImage {
            bytes,
            width: ASSUMED_SIZE,
            height: ASSUMED_SIZE,
            metadata: json!({
                "modelVersion": self.config.model,
                "apiProvider": "google-gemini",
                "mimeType": mime_type,
                "seed": request.seed,
            }),
        })
    }

    fn name(&self) -> &str {
        "google-gemini"
    }
}

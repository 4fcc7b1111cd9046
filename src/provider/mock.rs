use rand::Rng;
use std::time::Duration;

use super::{GeneratedImage, GenerationRequest, ImageProvider};
use crate::error::ProviderError;

/// Settings for [`MockProvider`].
#[derive(Debug, Clone)]
pub struct MockProviderConfig {
    /// Simulated latency per call.
    pub delay: Duration,
    /// Probability (0.0 to 1.0) that a call fails.
    pub fail_rate: f64,
    pub width: u32,
    pub height: u32,
}

impl Default for MockProviderConfig {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail_rate: 0.0,
            width: 512,
            height: 512,
        }
    }
}

impl MockProviderConfig {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_fail_rate(mut self, rate: f64) -> Self {
        self.fail_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

/// Fast offline provider returning synthetic bytes tagged with prompt and seed.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    config: MockProviderConfig,
}

impl MockProvider {
    pub fn new(config: MockProviderConfig) -> Self {
        Self { config }
    }
}

impl ImageProvider for MockProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        if self.config.fail_rate > 0.0 && rand::rng().random::<f64>() < self.config.fail_rate {
            return Err(ProviderError::Generation(
                "Mock generation failed (simulated failure)".into(),
            ));
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let prefix: String = request.prompt.chars().take(20).collect();
        let bytes = format!("PNG_FAKE_DATA_{}_{}_{}", timestamp, request.seed, prefix).into_bytes();

        Ok(GeneratedImage {
            bytes,
            width: self.config.width,
            height: self.config.height,
            metadata: serde_json::json!({
                "modelVersion": "mock-v1.0",
                "seed": request.seed,
                "executionTime": self.config.delay.as_millis() as u64,
                "imageToImage": request.reference.is_some(),
            }),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

//! Image-generation providers.
//!
//! The orchestrator treats a provider as an unreliable remote function: any
//! call may fail, and a failure never carries a partial image.

pub mod gemini;
pub mod mock;

pub use gemini::{GeminiConfig, GeminiProvider};
pub use mock::{MockProvider, MockProviderConfig};

use std::future::Future;

use crate::error::ProviderError;
use crate::types::ReferenceImage;

/// Parameters for one generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub seed: i64,
    /// Reference image for image-to-image composition; `None` = text-to-image.
    pub reference: Option<ReferenceImage>,
}

/// A generated image as returned by a provider.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Opaque provider metadata, persisted as JSON.
    pub metadata: serde_json::Value,
}

/// Trait implemented by every image-generation backend.
///
/// # Example
///
/// ```ignore
/// use peelpack_gen::provider::*;
/// use peelpack_gen::ProviderError;
///
/// struct Solid;
///
/// impl ImageProvider for Solid {
///     async fn generate(&self, req: &GenerationRequest) -> Result<GeneratedImage, ProviderError> {
///         Ok(GeneratedImage {
///             bytes: vec![0; 16],
///             width: 4,
///             height: 4,
///             metadata: serde_json::json!({ "seed": req.seed }),
///         })
///     }
/// }
/// ```
pub trait ImageProvider: Send + Sync + 'static {
    fn generate(
        &self,
        request: &GenerationRequest,
    ) -> impl Future<Output = Result<GeneratedImage, ProviderError>> + Send;

    /// Human-readable provider name, used in logging.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

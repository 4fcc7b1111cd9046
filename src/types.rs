use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::GenError;

/// Number of emotion portraits per project.
pub const EMOTION_COUNT: usize = 9;
/// Number of surprise scenario portraits per project.
pub const SURPRISE_COUNT: usize = 7;
/// Total images generated for one project.
pub const IMAGES_PER_PROJECT: usize = EMOTION_COUNT + SURPRISE_COUNT;

/// Seed offset separating the surprise range from the emotion range.
pub const SURPRISE_SEED_OFFSET: i64 = 2000;
/// Seed offset applied to an image's own seed for its single retry.
pub const RETRY_SEED_OFFSET: i64 = 1000;

/// Largest caller-supplied seed base whose surprise seeds and their retries
/// still fit in an `i64`.
pub const MAX_SEED_BASE: i64 =
    i64::MAX - SURPRISE_SEED_OFFSET - RETRY_SEED_OFFSET - (SURPRISE_COUNT as i64 - 1);

/// Description used for image-only input when the payload carries none.
pub const DEFAULT_IMAGE_DESCRIPTION: &str = "the character shown in the reference image";

/// What kind of input the user supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Text,
    Image,
    Mixed,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Text => "text",
            InputKind::Image => "image",
            InputKind::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(InputKind::Text),
            "image" => Some(InputKind::Image),
            "mixed" => Some(InputKind::Mixed),
            _ => None,
        }
    }
}

/// Project lifecycle: Pending -> Generating -> Completed/PartialFailed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Generating,
    Completed,
    PartialFailed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Generating => "generating",
            ProjectStatus::Completed => "completed",
            ProjectStatus::PartialFailed => "partial_failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ProjectStatus::Pending),
            "generating" => Some(ProjectStatus::Generating),
            "completed" => Some(ProjectStatus::Completed),
            "partial_failed" => Some(ProjectStatus::PartialFailed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProjectStatus::Completed | ProjectStatus::PartialFailed)
    }
}

/// Image lifecycle: Pending -> Generating -> Success/Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Generating,
    Success,
    Failed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Pending => "pending",
            ImageStatus::Generating => "generating",
            ImageStatus::Success => "success",
            ImageStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ImageStatus::Pending),
            "generating" => Some(ImageStatus::Generating),
            "success" => Some(ImageStatus::Success),
            "failed" => Some(ImageStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImageStatus::Success | ImageStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Emotion,
    Surprise,
}

impl ImageCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageCategory::Emotion => "emotion",
            ImageCategory::Surprise => "surprise",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "emotion" => Some(ImageCategory::Emotion),
            "surprise" => Some(ImageCategory::Surprise),
            _ => None,
        }
    }
}

/// The nine fixed emotion tags, in canonical generation order.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Surprised,
    Thinking,
    Shy,
    Proud,
    Tired,
    Love,
}

impl Emotion {
    pub const ALL: [Emotion; EMOTION_COUNT] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Thinking,
        Emotion::Shy,
        Emotion::Proud,
        Emotion::Tired,
        Emotion::Love,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Thinking => "thinking",
            Emotion::Shy => "shy",
            Emotion::Proud => "proud",
            Emotion::Tired => "tired",
            Emotion::Love => "love",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Emotion::ALL.iter().copied().find(|e| e.as_str() == s)
    }

    /// Position of this emotion in the canonical order.
    pub fn position(&self) -> usize {
        *self as usize
    }
}

/// Category-specific discriminator of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "category")]
pub enum Variant {
    Emotion { emotion: Emotion },
    Surprise { index: u8 },
}

impl Variant {
    pub fn category(&self) -> ImageCategory {
        match self {
            Variant::Emotion { .. } => ImageCategory::Emotion,
            Variant::Surprise { .. } => ImageCategory::Surprise,
        }
    }

    /// Seed for this variant given the project's seed base.
    pub fn seed(&self, base: i64) -> i64 {
        match self {
            Variant::Emotion { emotion } => base + emotion.position() as i64,
            Variant::Surprise { index } => base + SURPRISE_SEED_OFFSET + *index as i64,
        }
    }
}

/// A project: one user request expanded into sixteen images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub input_kind: InputKind,
    pub input_content: String,
    pub style_id: Option<String>,
    pub custom_prompt: Option<String>,
    /// Seed base, fixed at creation.
    pub seed: i64,
    pub status: ProjectStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// A single generated (or to-be-generated) image of a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub id: String,
    pub project_id: String,
    pub category: ImageCategory,
    pub emotion_type: Option<Emotion>,
    pub surprise_index: Option<u8>,
    pub prompt: String,
    pub seed: i64,
    pub file_path: String,
    pub status: ImageStatus,
    pub error_message: Option<String>,
    /// 0 until the first failure, then 1 forever.
    pub retry_count: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Opaque provider metadata as a JSON string.
    pub model_metadata: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Image {
    pub fn variant(&self) -> Option<Variant> {
        match self.category {
            ImageCategory::Emotion => self.emotion_type.map(|emotion| Variant::Emotion { emotion }),
            ImageCategory::Surprise => self.surprise_index.map(|index| Variant::Surprise { index }),
        }
    }
}

/// A preset style whose template is appended to the user's description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub id: String,
    pub display_name: String,
    pub description: String,
    pub prompt_template: String,
    pub thumbnail_url: Option<String>,
    pub sort_order: i32,
    pub is_active: bool,
}

/// Request to create a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub input_kind: InputKind,
    /// Free text for `text`; a JSON [`ImagePayload`] for `image` and `mixed`.
    pub input_content: String,
    #[serde(default)]
    pub style_id: Option<String>,
    #[serde(default)]
    pub custom_prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<i64>,
}

impl CreateProjectRequest {
    /// Text-only request with no style or addendum.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            input_kind: InputKind::Text,
            input_content: content.into(),
            style_id: None,
            custom_prompt: None,
            seed: None,
        }
    }

    pub fn with_style(mut self, style_id: impl Into<String>) -> Self {
        self.style_id = Some(style_id.into());
        self
    }

    pub fn with_custom_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.custom_prompt = Some(prompt.into());
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Structured payload carried in `input_content` for image and mixed input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePayload {
    pub mime_type: String,
    pub base64_data: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A reference image forwarded to the provider for image-to-image composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub mime_type: String,
    pub base64_data: String,
}

/// Validated form of a creation request's input.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    /// The user's own description, before style and addendum are merged in.
    pub description: String,
    pub reference: Option<ReferenceImage>,
}

impl CreateProjectRequest {
    /// Validate the input and split it into a description and optional reference image.
    ///
    /// This is the only place a creation call can fail before any image exists.
    pub fn resolve_input(&self) -> Result<ResolvedInput, GenError> {
        if self.input_content.trim().is_empty() {
            return Err(GenError::InvalidRequest("inputContent is empty".into()));
        }

        if let Some(seed) = self.seed.filter(|&s| s > MAX_SEED_BASE) {
            return Err(GenError::InvalidRequest(format!(
                "seed {} is too large, the maximum is {}",
                seed, MAX_SEED_BASE
            )));
        }

        if self.input_kind == InputKind::Text {
            return Ok(ResolvedInput {
                description: self.input_content.clone(),
                reference: None,
            });
        }

        let payload: ImagePayload = serde_json::from_str(&self.input_content).map_err(|e| {
            GenError::InvalidRequest(format!(
                "{} input is not a valid image payload: {}",
                self.input_kind.as_str(),
                e
            ))
        })?;

        if !payload.mime_type.starts_with("image/") {
            return Err(GenError::InvalidRequest(format!(
                "Unsupported reference mime type: {}",
                payload.mime_type
            )));
        }

        base64::engine::general_purpose::STANDARD
            .decode(payload.base64_data.as_bytes())
            .map_err(|e| {
                GenError::InvalidRequest(format!("Reference image is not valid base64: {}", e))
            })?;

        let description = payload
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);

        let description = match (self.input_kind, description) {
            (_, Some(d)) => d,
            (InputKind::Mixed, None) => {
                return Err(GenError::InvalidRequest(
                    "mixed input requires a description".into(),
                ))
            }
            _ => DEFAULT_IMAGE_DESCRIPTION.to_string(),
        };

        Ok(ResolvedInput {
            description,
            reference: Some(ReferenceImage {
                mime_type: payload.mime_type,
                base64_data: payload.base64_data,
            }),
        })
    }
}

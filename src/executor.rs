use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::db::Database;
use crate::error::GenError;
use crate::progress::ProgressPublisher;
use crate::provider::{GenerationRequest, ImageProvider};
use crate::storage::Storage;
use crate::types::{Image, ImageStatus, ReferenceImage, RETRY_SEED_OFFSET};

/// Runs a single image through `generating` to `success` or `failed`.
///
/// A failed first attempt is retried once with the seed moved by
/// [`RETRY_SEED_OFFSET`]. Every error ends up as a persisted image state;
/// [`execute`](Self::execute) never returns one.
pub struct TaskExecutor<P, S> {
    db: Database,
    storage: Arc<S>,
    provider: Arc<P>,
    progress: ProgressPublisher,
}

impl<P, S> Clone for TaskExecutor<P, S> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            storage: Arc::clone(&self.storage),
            provider: Arc::clone(&self.provider),
            progress: self.progress.clone(),
        }
    }
}

impl<P, S> TaskExecutor<P, S>
where
    P: ImageProvider,
    S: Storage,
{
    pub fn new(
        db: Database,
        storage: Arc<S>,
        provider: Arc<P>,
        progress: ProgressPublisher,
    ) -> Self {
        Self {
            db,
            storage,
            provider,
            progress,
        }
    }

    /// Execute `image` and return its terminal status.
    pub async fn execute(&self, image: &Image, reference: Option<&ReferenceImage>) -> ImageStatus {
        let project_id = image.project_id.as_str();
        let image_id = image.id.as_str();

        if let Err(e) = self.db.mark_image_generating(image_id) {
            return self.fail(image, &e);
        }
        self.progress.notify(project_id, None);

        let original_seed = image.seed;
        let mut seed = original_seed;
        let mut attempt = 1u32;

        loop {
            debug!(project_id, image_id, seed, attempt, "Generating image");

            let err = match self.attempt(image, seed, reference).await {
                Ok(()) => {
                    info!(project_id, image_id, seed, attempt, "Image generated");
                    self.progress.notify(project_id, Some(image_id));
                    return ImageStatus::Success;
                }
                Err(e) => e,
            };

            warn!(project_id, image_id, seed, attempt, error = %err, "Image attempt failed");

            // Always decide from the stored counter, not from local state.
            let retried = match self.db.get_image(image_id) {
                Ok(Some(current)) => current.retry_count > 0,
                Ok(None) => true,
                Err(e) => {
                    error!(image_id, error = %e, "Failed to re-read image before retry");
                    true
                }
            };
            if retried {
                return self.fail(image, &err);
            }

            seed = original_seed + RETRY_SEED_OFFSET;
            if let Err(e) = self.db.record_retry(image_id, seed) {
                return self.fail(image, &e);
            }
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        image: &Image,
        seed: i64,
        reference: Option<&ReferenceImage>,
    ) -> Result<(), GenError> {
        let request = GenerationRequest {
            prompt: image.prompt.clone(),
            seed,
            reference: reference.cloned(),
        };
        let generated = self.provider.generate(&request).await?;

        self.storage.save(&image.file_path, &generated.bytes).await?;

        let metadata = serde_json::to_string(&generated.metadata)?;
        self.db
            .mark_image_success(&image.id, generated.width, generated.height, &metadata)
    }

    fn fail(&self, image: &Image, err: &GenError) -> ImageStatus {
        error!(
            project_id = %image.project_id,
            image_id = %image.id,
            error = %err,
            "Image generation failed"
        );
        if let Err(e) = self.db.mark_image_failed(&image.id, &err.to_string()) {
            error!(image_id = %image.id, error = %e, "Failed to persist image failure");
        }
        self.progress.notify(&image.project_id, None);
        ImageStatus::Failed
    }
}

//! Batch orchestration: one creation request becomes sixteen concurrently
//! executed images and a terminal project status.

use rand::Rng;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::GenConfig;
use crate::db::Database;
use crate::error::GenError;
use crate::events::{channel_name, ProgressEvent};
use crate::executor::TaskExecutor;
use crate::progress::ProgressPublisher;
use crate::prompt::{build_tasks, merge_prompt};
use crate::provider::ImageProvider;
use crate::pubsub::{PubSub, Subscription};
use crate::storage::{image_path, Storage};
use crate::types::*;

/// Upper bound (exclusive) for randomly chosen seed bases.
const MAX_RANDOM_SEED: i64 = 1_000_000;

/// A project persisted and ready to run.
struct PreparedBatch {
    project_id: String,
    images: Vec<Image>,
    reference: Option<ReferenceImage>,
}

struct Inner<P, S> {
    db: Database,
    pubsub: PubSub<ProgressEvent>,
    progress: ProgressPublisher,
    executor: TaskExecutor<P, S>,
    limiter: Arc<Semaphore>,
}

/// Entry point for creating and observing character packs.
///
/// Cheap to clone; clones share the database, provider and channels.
pub struct Orchestrator<P, S> {
    inner: Arc<Inner<P, S>>,
}

impl<P, S> Clone for Orchestrator<P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S> Orchestrator<P, S>
where
    P: ImageProvider,
    S: Storage,
{
    pub fn new(
        db: Database,
        storage: S,
        provider: P,
        pubsub: PubSub<ProgressEvent>,
        config: &GenConfig,
    ) -> Self {
        let progress = ProgressPublisher::new(db.clone(), pubsub.clone());
        let executor = TaskExecutor::new(
            db.clone(),
            Arc::new(storage),
            Arc::new(provider),
            progress.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                db,
                pubsub,
                progress,
                executor,
                limiter: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            }),
        }
    }

    /// Open the database named by `config`, seed the style presets and
    /// build an orchestrator with a fresh channel registry.
    pub fn from_config(config: &GenConfig, storage: S, provider: P) -> Result<Self, GenError> {
        let db = Database::open(config.db_path.as_deref())?;
        db.seed_default_styles()?;
        let pubsub = PubSub::new(config.channel_capacity);
        info!(provider = provider.name(), "Orchestrator ready");
        Ok(Self::new(db, storage, provider, pubsub, config))
    }

    /// Persist a new project with its sixteen pending images and start
    /// generating in the background. Returns the project id immediately.
    ///
    /// Only invalid input (or a missing tokio runtime) fails here; provider
    /// and storage failures surface later as image states.
    pub fn create(&self, request: CreateProjectRequest) -> Result<String, GenError> {
        let handle = Handle::try_current().map_err(|_| GenError::NoRuntime)?;
        let batch = self.prepare(&request)?;
        let project_id = batch.project_id.clone();

        let inner = Arc::clone(&self.inner);
        handle.spawn(async move {
            inner.run(batch).await;
        });

        Ok(project_id)
    }

    /// Create a project and wait for it to finish. Returns the final record.
    pub async fn run_to_completion(
        &self,
        request: CreateProjectRequest,
    ) -> Result<Project, GenError> {
        let batch = self.prepare(&request)?;
        let project_id = batch.project_id.clone();
        Arc::clone(&self.inner).run(batch).await;
        self.project(&project_id)?
            .ok_or_else(|| GenError::NotFound(format!("Project '{}'", project_id)))
    }

    /// Follow a project's progress. Only snapshots published after this call arrive.
    pub fn subscribe(&self, project_id: &str) -> Subscription<ProgressEvent> {
        self.inner.pubsub.subscribe(&channel_name(project_id))
    }

    /// Current snapshot of a project, for observers that join late.
    pub fn snapshot(&self, project_id: &str) -> Result<ProgressEvent, GenError> {
        self.inner.progress.snapshot(project_id, None)
    }

    pub fn project(&self, project_id: &str) -> Result<Option<Project>, GenError> {
        self.inner.db.get_project(project_id)
    }

    pub fn projects(&self) -> Result<Vec<Project>, GenError> {
        self.inner.db.list_projects()
    }

    pub fn images(&self, project_id: &str) -> Result<Vec<Image>, GenError> {
        self.inner.db.images_by_project(project_id)
    }

    pub fn styles(&self) -> Result<Vec<Style>, GenError> {
        self.inner.db.active_styles()
    }

    pub fn database(&self) -> &Database {
        &self.inner.db
    }

    fn prepare(&self, request: &CreateProjectRequest) -> Result<PreparedBatch, GenError> {
        let input = request.resolve_input()?;
        let seed = request
            .seed
            .unwrap_or_else(|| rand::rng().random_range(0..MAX_RANDOM_SEED));

        let style_template = match request.style_id.as_deref() {
            Some(style_id) => match self.inner.db.get_style(style_id)? {
                Some(style) => Some(style.prompt_template),
                None => {
                    warn!(style_id, "Unknown style, generating without it");
                    None
                }
            },
            None => None,
        };

        let base_prompt = merge_prompt(
            &input.description,
            style_template.as_deref(),
            request.custom_prompt.as_deref(),
        );

        let project_id = Uuid::new_v4().to_string();
        let ts = chrono::Utc::now().to_rfc3339();

        let project = Project {
            id: project_id.clone(),
            input_kind: request.input_kind,
            input_content: request.input_content.clone(),
            style_id: request.style_id.clone(),
            custom_prompt: request.custom_prompt.clone(),
            seed,
            status: ProjectStatus::Pending,
            created_at: ts.clone(),
            updated_at: ts.clone(),
        };

        let images: Vec<Image> = build_tasks(&base_prompt)
            .into_iter()
            .map(|task| {
                let image_id = Uuid::new_v4().to_string();
                let (emotion_type, surprise_index) = match task.variant {
                    Variant::Emotion { emotion } => (Some(emotion), None),
                    Variant::Surprise { index } => (None, Some(index)),
                };
                Image {
                    file_path: image_path(&project_id, &image_id),
                    id: image_id,
                    project_id: project_id.clone(),
                    category: task.variant.category(),
                    emotion_type,
                    surprise_index,
                    seed: task.seed(seed),
                    prompt: task.prompt,
                    status: ImageStatus::Pending,
                    error_message: None,
                    retry_count: 0,
                    width: None,
                    height: None,
                    model_metadata: None,
                    created_at: ts.clone(),
                    updated_at: ts.clone(),
                }
            })
            .collect();

        self.inner.db.insert_project_with_images(&project, &images)?;

        info!(
            project_id = %project_id,
            input_kind = request.input_kind.as_str(),
            seed,
            images = images.len(),
            "Project created"
        );

        Ok(PreparedBatch {
            project_id,
            images,
            reference: input.reference,
        })
    }
}

impl<P, S> Inner<P, S>
where
    P: ImageProvider,
    S: Storage,
{
    async fn run(self: Arc<Self>, batch: PreparedBatch) -> ProjectStatus {
        let PreparedBatch {
            project_id,
            images,
            reference,
        } = batch;

        if let Err(e) = self
            .db
            .update_project_status(&project_id, ProjectStatus::Generating)
        {
            error!(project_id = %project_id, error = %e, "Failed to mark project as generating");
        }
        self.progress.notify(&project_id, None);

        let mut tasks = JoinSet::new();
        for image in images {
            let inner = Arc::clone(&self);
            let reference = reference.clone();
            tasks.spawn(async move {
                let _permit = inner.limiter.acquire().await.ok();
                inner.executor.execute(&image, reference.as_ref()).await
            });
        }

        // Settle every task; one failing never stops the rest.
        while let Some(joined) = tasks.join_next().await {
            let Err(e) = joined else { continue };
            error!(project_id = %project_id, error = %e, "Image task aborted");
        }

        let status = self.finalize(&project_id);
        self.progress.notify(&project_id, None);
        status
    }

    /// Decide the terminal status from stored image states and persist it.
    fn finalize(&self, project_id: &str) -> ProjectStatus {
        let images = match self.db.images_by_project(project_id) {
            Ok(images) => images,
            Err(e) => {
                error!(project_id, error = %e, "Failed to load images for final status");
                Vec::new()
            }
        };

        for image in images.iter().filter(|i| !i.status.is_terminal()) {
            error!(project_id, image_id = %image.id, "Image left unfinished, marking as failed");
            if let Err(e) = self
                .db
                .mark_image_failed(&image.id, "Generation task ended unexpectedly")
            {
                error!(image_id = %image.id, error = %e, "Failed to persist image failure");
            }
        }

        let succeeded = images
            .iter()
            .filter(|i| i.status == ImageStatus::Success)
            .count();
        let status = if succeeded == IMAGES_PER_PROJECT {
            ProjectStatus::Completed
        } else {
            ProjectStatus::PartialFailed
        };

        if let Err(e) = self.db.update_project_status(project_id, status) {
            error!(project_id, error = %e, "Failed to persist final project status");
        }

        info!(
            project_id,
            status = status.as_str(),
            succeeded,
            failed = images.len() - succeeded,
            "Project finished"
        );
        status
    }
}

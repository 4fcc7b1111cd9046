use chrono::Utc;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::GenError;
use crate::events::{channel_name, ProgressEvent};
use crate::pubsub::PubSub;

/// Recomputes a project's aggregate state and publishes it on the project channel.
///
/// Never mutates project or image records.
#[derive(Clone)]
pub struct ProgressPublisher {
    db: Database,
    pubsub: PubSub<ProgressEvent>,
    // Serializes read-then-publish so snapshots leave in the order they were read.
    order: Arc<Mutex<()>>,
}

impl ProgressPublisher {
    pub fn new(db: Database, pubsub: PubSub<ProgressEvent>) -> Self {
        Self {
            db,
            pubsub,
            order: Arc::new(Mutex::new(())),
        }
    }

    /// Build the current snapshot without publishing it.
    pub fn snapshot(
        &self,
        project_id: &str,
        latest_image_id: Option<&str>,
    ) -> Result<ProgressEvent, GenError> {
        let project = self
            .db
            .get_project(project_id)?
            .ok_or_else(|| GenError::NotFound(format!("Project '{}'", project_id)))?;
        let images = self.db.images_by_project(project_id)?;

        let completed_count = images.iter().filter(|i| i.status.is_terminal()).count();
        let latest_image =
            latest_image_id.and_then(|id| images.iter().find(|i| i.id == id).cloned());

        Ok(ProgressEvent {
            project_id: project.id,
            status: project.status,
            completed_count,
            total_count: images.len(),
            latest_image,
            timestamp: Utc::now(),
        })
    }

    /// Publish a fresh snapshot. Returns how many subscribers received it.
    pub fn publish(
        &self,
        project_id: &str,
        latest_image_id: Option<&str>,
    ) -> Result<usize, GenError> {
        let _guard = self.order.lock().unwrap_or_else(|p| p.into_inner());
        let event = self.snapshot(project_id, latest_image_id)?;
        debug!(
            project_id,
            completed = event.completed_count,
            total = event.total_count,
            status = event.status.as_str(),
            "Publishing progress"
        );
        Ok(self.pubsub.publish(&channel_name(project_id), event))
    }

    /// Like [`publish`](Self::publish), but a failure is only logged.
    pub(crate) fn notify(&self, project_id: &str, latest_image_id: Option<&str>) {
        if let Err(e) = self.publish(project_id, latest_image_id) {
            warn!(project_id, error = %e, "Failed to publish progress");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::*;

    fn seed_project(db: &Database) -> Vec<Image> {
        let ts = Utc::now().to_rfc3339();
        let project = Project {
            id: "p1".into(),
            input_kind: InputKind::Text,
            input_content: "a robot".into(),
            style_id: None,
            custom_prompt: None,
            seed: 10,
            status: ProjectStatus::Generating,
            created_at: ts.clone(),
            updated_at: ts.clone(),
        };
        let images: Vec<Image> = (0..3u8)
            .map(|i| Image {
                id: format!("i{}", i),
                project_id: "p1".into(),
                category: ImageCategory::Surprise,
                emotion_type: None,
                surprise_index: Some(i),
                prompt: "x".into(),
                seed: 2010 + i as i64,
                file_path: format!("images/p1/i{}.png", i),
                status: ImageStatus::Pending,
                error_message: None,
                retry_count: 0,
                width: None,
                height: None,
                model_metadata: None,
                created_at: ts.clone(),
                updated_at: ts.clone(),
            })
            .collect();
        db.insert_project_with_images(&project, &images).unwrap();
        images
    }

    #[test]
    fn test_snapshot_counts_only_terminal_images() {
        let db = Database::open(None).unwrap();
        seed_project(&db);
        db.mark_image_generating("i0").unwrap();
        db.mark_image_success("i1", 512, 512, "{}").unwrap();
        db.mark_image_failed("i2", "boom").unwrap();

        let publisher = ProgressPublisher::new(db, PubSub::new(8));
        let event = publisher.snapshot("p1", Some("i2")).unwrap();
        assert_eq!(event.completed_count, 2);
        assert_eq!(event.total_count, 3);
        assert_eq!(event.status, ProjectStatus::Generating);
        let latest = event.latest_image.unwrap();
        assert_eq!(latest.id, "i2");
        assert_eq!(latest.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_snapshot_unknown_project() {
        let publisher = ProgressPublisher::new(Database::open(None).unwrap(), PubSub::new(8));
        assert!(matches!(
            publisher.snapshot("missing", None),
            Err(GenError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_publish_reaches_project_channel() {
        let db = Database::open(None).unwrap();
        seed_project(&db);
        let pubsub = PubSub::new(8);
        let publisher = ProgressPublisher::new(db.clone(), pubsub.clone());

        let mut sub = pubsub.subscribe(&channel_name("p1"));
        let mut other = pubsub.subscribe(&channel_name("p2"));
        assert_eq!(publisher.publish("p1", None).unwrap(), 1);

        let event = sub.recv().await.unwrap();
        assert_eq!(event.project_id, "p1");
        assert!(event.latest_image.is_none());
        assert!(other.try_recv().is_none());

        // Publishing is read-only
        let images = db.images_by_project("p1").unwrap();
        assert!(images.iter().all(|i| i.status == ImageStatus::Pending));
    }
}

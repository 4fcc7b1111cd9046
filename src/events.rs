use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Image, ProjectStatus};

/// Name of the progress channel for a project.
pub fn channel_name(project_id: &str) -> String {
    format!("project:{}", project_id)
}

/// Aggregate snapshot of a project, published after every state change.
///
/// Each snapshot is authoritative as of `timestamp`; it is not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub project_id: String,
    pub status: ProjectStatus,
    /// Images that reached `success` or `failed`.
    pub completed_count: usize,
    pub total_count: usize,
    /// The image whose change triggered this snapshot, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<Image>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of finished images, 0.0 to 1.0.
    pub fn progress(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        self.completed_count as f64 / self.total_count as f64
    }
}

use std::future::Future;
use std::path::{Component, Path, PathBuf};

use crate::error::GenError;

/// Blob storage for generated image files, addressed by relative path.
pub trait Storage: Send + Sync + 'static {
    /// Write `bytes` at `relative_path`, creating parent directories as needed.
    fn save(
        &self,
        relative_path: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), GenError>> + Send;

    fn read(&self, relative_path: &str) -> impl Future<Output = Result<Vec<u8>, GenError>> + Send;

    fn exists(&self, relative_path: &str) -> impl Future<Output = Result<bool, GenError>> + Send;

    fn delete(&self, relative_path: &str) -> impl Future<Output = Result<(), GenError>> + Send;
}

/// Relative storage path for an image file.
pub fn image_path(project_id: &str, image_id: &str) -> String {
    format!("images/{}/{}.png", project_id, image_id)
}

/// [`Storage`] backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    base_path: PathBuf,
}

impl FsStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Join `relative_path` onto the base, refusing anything that could escape it.
    fn resolve(&self, relative_path: &str) -> Result<PathBuf, GenError> {
        let rel = Path::new(relative_path);
        let safe = !relative_path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(GenError::InvalidRequest(format!(
                "Storage path must be relative and stay inside the base: {}",
                relative_path
            )));
        }
        Ok(self.base_path.join(rel))
    }
}

impl Storage for FsStorage {
    async fn save(&self, relative_path: &str, bytes: &[u8]) -> Result<(), GenError> {
        let full = self.resolve(relative_path)?;
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| GenError::storage(relative_path, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| GenError::storage(relative_path, e))
    }

    async fn read(&self, relative_path: &str) -> Result<Vec<u8>, GenError> {
        let full = self.resolve(relative_path)?;
        tokio::fs::read(&full)
            .await
            .map_err(|e| GenError::storage(relative_path, e))
    }

    async fn exists(&self, relative_path: &str) -> Result<bool, GenError> {
        let full = self.resolve(relative_path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| GenError::storage(relative_path, e))
    }

    async fn delete(&self, relative_path: &str) -> Result<(), GenError> {
        let full = self.resolve(relative_path)?;
        tokio::fs::remove_file(&full)
            .await
            .map_err(|e| GenError::storage(relative_path, e))
    }
}

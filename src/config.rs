use std::path::PathBuf;

use crate::error::GenError;

/// Configuration for the generation core.
///
/// Use [`GenConfig::builder()`] for ergonomic construction,
/// [`GenConfig::from_env()`] to read the process environment, or
/// [`GenConfig::default()`] for sensible defaults (in-memory DB, `./data` storage).
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// Path to SQLite database file. `None` = in-memory database.
    pub db_path: Option<PathBuf>,

    /// Root directory for generated image files.
    pub storage_path: PathBuf,

    /// Maximum provider calls in flight across all running projects.
    pub max_concurrent: usize,

    /// Per-subscriber buffer size for progress channels.
    pub channel_capacity: usize,

    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            storage_path: PathBuf::from("./data"),
            max_concurrent: crate::types::IMAGES_PER_PROJECT,
            channel_capacity: 256,
            log_level: "info".to_string(),
        }
    }
}

impl GenConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> GenConfigBuilder {
        GenConfigBuilder::default()
    }

    /// Load from `DB_PATH`, `STORAGE_PATH`, `GEN_MAX_CONCURRENT`,
    /// `GEN_CHANNEL_CAPACITY` and `LOG_LEVEL`. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, GenError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, GenError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(path) = lookup("DB_PATH").filter(|p| !p.is_empty()) {
            if path != ":memory:" {
                builder = builder.with_db_path(PathBuf::from(path));
            }
        }
        if let Some(path) = lookup("STORAGE_PATH").filter(|p| !p.is_empty()) {
            builder = builder.with_storage_path(PathBuf::from(path));
        }
        if let Some(raw) = lookup("GEN_MAX_CONCURRENT") {
            builder = builder.with_max_concurrent(parse_positive("GEN_MAX_CONCURRENT", &raw)?);
        }
        if let Some(raw) = lookup("GEN_CHANNEL_CAPACITY") {
            builder =
                builder.with_channel_capacity(parse_positive("GEN_CHANNEL_CAPACITY", &raw)?);
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.is_empty()) {
            builder = builder.with_log_level(level);
        }

        Ok(builder.build())
    }
}

fn parse_positive(key: &str, raw: &str) -> Result<usize, GenError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(GenError::InvalidConfig(format!(
            "{} must be a positive integer, got {:?}",
            key, raw
        ))),
    }
}

/// Builder for [`GenConfig`].
#[derive(Default)]
pub struct GenConfigBuilder {
    config: GenConfig,
}

impl GenConfigBuilder {
    /// Set the SQLite database path for persistence. Omit for in-memory.
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Set the root directory generated images are written under.
    pub fn with_storage_path(mut self, path: PathBuf) -> Self {
        self.config.storage_path = path;
        self
    }

    /// Cap concurrent provider calls. Values below 1 are raised to 1.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max.max(1);
        self
    }

    /// Set the per-subscriber progress buffer. Values below 1 are raised to 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Build the final [`GenConfig`].
    pub fn build(self) -> GenConfig {
        self.config
    }
}

use thiserror::Error;

/// Errors raised by an [`ImageProvider`](crate::provider::ImageProvider).
///
/// Every variant is a retryable failure from the orchestrator's point of
/// view; none of them carry partial output.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider returned a non-success HTTP status.
    #[error("Provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response was missing expected fields or carried no image.
    #[error("{0}")]
    InvalidResponse(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The provider reported a generation-level failure.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// The provider did not answer within its own deadline.
    #[error("Generation timed out")]
    Timeout,
}

/// Errors that can occur in the generation core.
#[derive(Error, Debug)]
pub enum GenError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error at {path}: {source}")]
    Storage {
        path: String,
        source: std::io::Error,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No tokio runtime available to run the batch")]
    NoRuntime,

    #[error("{0}")]
    Other(String),
}

impl GenError {
    pub(crate) fn database(err: anyhow::Error) -> Self {
        GenError::Database(format!("{:#}", err))
    }

    pub(crate) fn storage(path: &str, source: std::io::Error) -> Self {
        GenError::Storage {
            path: path.to_string(),
            source,
        }
    }
}

impl From<anyhow::Error> for GenError {
    fn from(err: anyhow::Error) -> Self {
        GenError::Other(format!("{:#}", err))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, GenError>;

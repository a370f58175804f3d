//! Worker error types.

use thiserror::Error;

use aura_media::MediaError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Unknown model: {0}")]
    InvalidModel(String),

    #[error("Illegal state transition: {0}")]
    InvalidTransition(String),

    #[error("Blocking task failed: {0}")]
    TaskFailed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] aura_storage::StorageError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn invalid_model(name: impl Into<String>) -> Self {
        Self::InvalidModel(name.into())
    }

    /// Message shown to the submitting client.
    pub fn user_message(&self) -> String {
        match self {
            WorkerError::Media(MediaError::BrokenVideo { .. }) => "The video is broken.".to_string(),
            WorkerError::Media(e) => e.to_string(),
            WorkerError::Storage(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Whether the source media itself is at fault, as opposed to the service.
    pub fn is_bad_input(&self) -> bool {
        matches!(
            self,
            WorkerError::Media(
                MediaError::BrokenVideo { .. }
                    | MediaError::InvalidVideo(_)
                    | MediaError::UnsupportedChannels(_)
                    | MediaError::UnsupportedShape(_)
                    | MediaError::Image(_)
            )
        )
    }
}

impl From<tokio::task::JoinError> for WorkerError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::TaskFailed(e.to_string())
    }
}

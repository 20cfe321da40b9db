use std::path::PathBuf;

use thiserror::Error;

use crate::data::DataError;

/// Result alias for training operations.
pub type TrainingResult<T> = Result<T, TrainingError>;

/// Failure to persist or reload a checkpoint blob.
///
/// Always fatal for the stage that produced it: the callback has no fallback
/// storage.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode checkpoint {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },

    #[error("Could not decode checkpoint {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: bincode::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrainingError {
    /// User-initiated cancellation; aborts the whole pipeline.
    #[error("Training cancelled")]
    Cancelled,

    /// The checkpointing callback failed inside stage `stage`.
    #[error("Checkpoint failure in stage '{stage}': {text}")]
    Checkpoint { stage: String, text: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Data(#[from] DataError),

    /// A training stage descriptor is unusable.
    #[error("Invalid stage '{name}': {reason}")]
    InvalidStage { name: String, reason: &'static str },

    /// Checkpoint intervals or selection strategy are inconsistent.
    #[error("Invalid checkpoint configuration: {reason}")]
    InvalidCheckpoint { reason: &'static str },

    /// Window schedule cannot be built for the dataset.
    #[error("Invalid curriculum: {reason}")]
    InvalidCurriculum { reason: String },
}

impl TrainingError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TrainingError::Cancelled)
    }
}

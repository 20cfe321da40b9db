use std::path::PathBuf;

use thiserror::Error;

use crate::{
    data::DataError,
    training::{PersistError, TrainingError},
};

/// Result alias for forecast evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Result alias for experiment orchestration.
pub type RunResult<T> = Result<T, ExperimentError>;

#[derive(Debug, Error)]
pub enum EvalError {
    /// Horizon is zero or longer than the test set.
    #[error("Horizon {horizon} is outside 1..={available}")]
    HorizonOutOfRange { horizon: usize, available: usize },

    /// One label per observed variable is required.
    #[error("Got {labels} labels for {variables} observed variables")]
    LabelMismatch { labels: usize, variables: usize },

    #[error("Could not write error table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Could not write frame to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config field '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ExperimentError {
    /// The shared token was set; sibling tasks were asked to stop.
    #[error("Experiment cancelled")]
    Cancelled,

    /// The model-setup collaborator could not build a location.
    #[error("Setup failed for location '{location}': {reason}")]
    Setup { location: String, reason: String },

    #[error("Could not create output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Training(#[from] TrainingError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl ExperimentError {
    pub fn is_cancellation(&self) -> bool {
        match self {
            ExperimentError::Cancelled => true,
            ExperimentError::Training(err) => err.is_cancellation(),
            _ => false,
        }
    }
}

//! Errors raised while constructing or slicing time-series datasets.
use thiserror::Error;

/// Result alias for dataset construction and slicing.
pub type DataResult<T> = Result<T, DataError>;

/// Validation failures for [`TimeseriesDataset`](crate::data::TimeseriesDataset)
/// and its views.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    /// Dataset has no variables or no time steps.
    #[error("Dataset is empty: {rows} variables x {cols} time steps")]
    EmptyDataset { rows: usize, cols: usize },

    /// Number of data columns differs from the number of time steps.
    #[error("Data has {columns} columns but {steps} time steps were given")]
    ColumnMismatch { columns: usize, steps: usize },

    /// A data point is NaN or infinite.
    #[error("Non-finite value {value} at variable {row}, step {col}")]
    NonFiniteData { row: usize, col: usize, value: f64 },

    /// Time steps must be finite and strictly increasing.
    #[error("Time steps must be finite and strictly increasing (violated at index {index})")]
    NonMonotonicTimes { index: usize },

    /// Time span must contain every time step.
    #[error("Time span ({t0}, {t1}) does not cover the time steps: {reason}")]
    InvalidTspan { t0: f64, t1: f64, reason: &'static str },

    /// Requested window or range exceeds the available steps.
    #[error("Requested {requested} time steps but only {available} are available")]
    WindowOutOfRange { requested: usize, available: usize },

    /// Requested window has zero length.
    #[error("Windows must contain at least one time step")]
    EmptyWindow,

    /// Split point must leave at least one step on each side.
    #[error("Cannot split {len} time steps at {at}: both parts must be non-empty")]
    InvalidSplit { at: usize, len: usize },
}

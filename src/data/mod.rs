//! data — validated time-series containers, training windows, batch cursors.
//!
//! Purpose
//! -------
//! Hold the ground truth a model is fitted against and hand out borrowed
//! windows and batches of it. Everything downstream (loss evaluation,
//! curriculum windows, forecast evaluation) reads data exclusively through the
//! types defined here.
//!
//! Key behaviors
//! -------------
//! - [`TimeseriesDataset`] validates a `[variable × step]` matrix together with
//!   its time span and output times once, at construction.
//! - [`DatasetView`] is a borrowed prefix or sub-range of a dataset; training
//!   windows are views and never silently diverging copies.
//! - [`CyclicBatches`] partitions a window into fixed-size batches and walks
//!   them with an explicit index-modulo cursor.
//!
//! Invariants & assumptions
//! ------------------------
//! - `data.ncols() == tsteps.len()` and `tsteps` is strictly increasing.
//! - All values are finite; gap-filling and smoothing happen upstream.
//! - Datasets are immutable after construction and shared via `Arc` between a
//!   location's loss evaluators, evaluator and renderer.
//!
//! Conventions
//! -----------
//! - Rows are observed variables, columns are time steps (0-based).
//! - A "window of length `w`" always means the first `w` time steps.
//!
//! Testing notes
//! -------------
//! - Unit tests cover construction failures, window bounds, splitting, and
//!   cursor wrap-around/restart behavior.
pub mod batches;
pub mod errors;
pub mod timeseries;

pub use self::batches::CyclicBatches;
pub use self::errors::{DataError, DataResult};
pub use self::timeseries::{DatasetView, TimeseriesDataset};

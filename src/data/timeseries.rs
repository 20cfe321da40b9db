//! Ground-truth containers: owned datasets and borrowed windows over them.
//!
//! Purpose
//! -------
//! Represent the observed time series of one location as an immutable
//! `[variable × step]` matrix with its time span and output times, and provide
//! zero-copy windows used for training, batching and evaluation.
//!
//! Key behaviors
//! -------------
//! - [`TimeseriesDataset::new`] validates shape, finiteness and time ordering.
//! - [`TimeseriesDataset::window`] borrows the first `len` steps.
//! - [`TimeseriesDataset::split`] produces owned train/test datasets (the two
//!   halves of an experiment are independent inputs, not views of each other).
//! - [`DatasetView::slice`] narrows a window to a batch range.
//!
//! Invariants & assumptions
//! ------------------------
//! - `tspan.0 <= tsteps[0]` and `tsteps[last] <= tspan.1`.
//! - A view's `tspan` starts at the parent's `tspan.0` and ends at the view's
//!   last time step; the IVP is always integrated from the dataset origin.
use std::ops::Range;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, s};

use crate::data::errors::{DataError, DataResult};

/// `TimeseriesDataset` — validated ground truth for one location.
///
/// Fields
/// ------
/// - `data`: `Array2<f64>`
///   Observations, one row per observed variable, one column per time step.
/// - `tspan`: `(f64, f64)`
///   Integration interval; the IVP initial state lives at `tspan.0`.
/// - `tsteps`: `Array1<f64>`
///   Strictly increasing output times, `tsteps.len() == data.ncols()`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeseriesDataset {
    data: Array2<f64>,
    tspan: (f64, f64),
    tsteps: Array1<f64>,
}

impl TimeseriesDataset {
    /// Construct a validated dataset.
    ///
    /// Errors
    /// ------
    /// - [`DataError::EmptyDataset`] when there are no rows or no columns.
    /// - [`DataError::ColumnMismatch`] when `data.ncols() != tsteps.len()`.
    /// - [`DataError::NonFiniteData`] for the first NaN/±∞ entry.
    /// - [`DataError::NonMonotonicTimes`] when `tsteps` is not strictly
    ///   increasing or contains non-finite values.
    /// - [`DataError::InvalidTspan`] when `tspan` does not cover `tsteps`.
    pub fn new(data: Array2<f64>, tspan: (f64, f64), tsteps: Array1<f64>) -> DataResult<Self> {
        let (rows, cols) = data.dim();
        if rows == 0 || cols == 0 {
            return Err(DataError::EmptyDataset { rows, cols });
        }
        if cols != tsteps.len() {
            return Err(DataError::ColumnMismatch { columns: cols, steps: tsteps.len() });
        }
        for ((row, col), &value) in data.indexed_iter() {
            if !value.is_finite() {
                return Err(DataError::NonFiniteData { row, col, value });
            }
        }
        for (index, pair) in tsteps.windows(2).into_iter().enumerate() {
            if !(pair[0].is_finite() && pair[1].is_finite()) || pair[1] <= pair[0] {
                return Err(DataError::NonMonotonicTimes { index: index + 1 });
            }
        }
        if !tsteps[0].is_finite() {
            return Err(DataError::NonMonotonicTimes { index: 0 });
        }
        let (t0, t1) = tspan;
        if !(t0.is_finite() && t1.is_finite()) || t1 < t0 {
            return Err(DataError::InvalidTspan { t0, t1, reason: "bounds must be finite and ordered" });
        }
        if tsteps[0] < t0 || tsteps[cols - 1] > t1 {
            return Err(DataError::InvalidTspan { t0, t1, reason: "time steps fall outside the span" });
        }
        Ok(Self { data, tspan, tsteps })
    }

    /// Convenience constructor for integer-spaced data starting at `t0`.
    ///
    /// Time steps are `t0, t0 + 1, …` and the span is `(t0, t_last)`.
    pub fn from_daily(data: Array2<f64>, t0: f64) -> DataResult<Self> {
        let n = data.ncols();
        let tsteps = Array1::from_iter((0..n).map(|i| t0 + i as f64));
        let t1 = if n == 0 { t0 } else { t0 + (n - 1) as f64 };
        Self::new(data, (t0, t1), tsteps)
    }

    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn tspan(&self) -> (f64, f64) {
        self.tspan
    }

    pub fn tsteps(&self) -> ArrayView1<'_, f64> {
        self.tsteps.view()
    }

    /// Number of observed variables (rows).
    pub fn n_vars(&self) -> usize {
        self.data.nrows()
    }

    /// Number of time steps (columns).
    pub fn len(&self) -> usize {
        self.data.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.data.ncols() == 0
    }

    /// View over the whole dataset.
    pub fn view(&self) -> DatasetView<'_> {
        DatasetView {
            data: self.data.view(),
            tsteps: self.tsteps.view(),
            t0: self.tspan.0,
        }
    }

    /// Borrow the first `len` time steps.
    ///
    /// Errors
    /// ------
    /// - [`DataError::EmptyWindow`] when `len == 0`.
    /// - [`DataError::WindowOutOfRange`] when `len > self.len()`.
    pub fn window(&self, len: usize) -> DataResult<DatasetView<'_>> {
        self.view().slice(0..len)
    }

    /// Split into owned `(train, test)` datasets at step `at`.
    ///
    /// The train part keeps the original `tspan.0` and ends at its last step;
    /// the test part spans from the last train step to the original end so a
    /// forecast integrated from the train origin covers it.
    pub fn split(&self, at: usize) -> DataResult<(TimeseriesDataset, TimeseriesDataset)> {
        let len = self.len();
        if at == 0 || at >= len {
            return Err(DataError::InvalidSplit { at, len });
        }
        let train_steps = self.tsteps.slice(s![..at]).to_owned();
        let test_steps = self.tsteps.slice(s![at..]).to_owned();
        let train_end = train_steps[at - 1];
        let train = TimeseriesDataset::new(
            self.data.slice(s![.., ..at]).to_owned(),
            (self.tspan.0, train_end),
            train_steps,
        )?;
        let test = TimeseriesDataset::new(
            self.data.slice(s![.., at..]).to_owned(),
            (train_end, self.tspan.1),
            test_steps,
        )?;
        Ok((train, test))
    }
}

/// `DatasetView` — borrowed sub-range of a [`TimeseriesDataset`].
///
/// `t0` is the integration origin inherited from the parent dataset, so the
/// span of a view is always `(t0, last time step of the view)`.
#[derive(Debug, Clone, Copy)]
pub struct DatasetView<'a> {
    data: ArrayView2<'a, f64>,
    tsteps: ArrayView1<'a, f64>,
    t0: f64,
}

impl<'a> DatasetView<'a> {
    pub fn data(&self) -> ArrayView2<'a, f64> {
        self.data
    }

    pub fn tsteps(&self) -> ArrayView1<'a, f64> {
        self.tsteps
    }

    pub fn len(&self) -> usize {
        self.tsteps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tsteps.is_empty()
    }

    /// Integration span `(origin, last time step)`.
    pub fn tspan(&self) -> (f64, f64) {
        let last = self.tsteps.len().checked_sub(1).map_or(self.t0, |i| self.tsteps[i]);
        (self.t0, last)
    }

    /// Narrow the view to `range` (indices relative to this view).
    pub fn slice(&self, range: Range<usize>) -> DataResult<DatasetView<'a>> {
        if range.start >= range.end {
            return Err(DataError::EmptyWindow);
        }
        if range.end > self.len() {
            return Err(DataError::WindowOutOfRange { requested: range.end, available: self.len() });
        }
        let data = self.data.slice_move(s![.., range.clone()]);
        let tsteps = self.tsteps.slice_move(s![range]);
        Ok(DatasetView { data, tsteps, t0: self.t0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Construction validation, windowing and train/test splitting of
    // `TimeseriesDataset`. Batch cursors are covered in `batches.rs`.
    // -------------------------------------------------------------------------

    fn two_by_five() -> TimeseriesDataset {
        let data = array![[1.0, 2.0, 3.0, 4.0, 5.0], [10.0, 20.0, 30.0, 40.0, 50.0]];
        TimeseriesDataset::from_daily(data, 0.0).expect("valid dataset")
    }

    #[test]
    // Purpose
    // -------
    // A column count that disagrees with the time steps is rejected.
    fn new_rejects_column_mismatch() {
        let data = array![[1.0, 2.0, 3.0]];
        let err = TimeseriesDataset::new(data, (0.0, 3.0), array![0.0, 1.0]).unwrap_err();
        assert_eq!(err, DataError::ColumnMismatch { columns: 3, steps: 2 });
    }

    #[test]
    fn new_rejects_non_finite_values_and_unordered_times() {
        let bad = TimeseriesDataset::new(array![[1.0, f64::NAN]], (0.0, 1.0), array![0.0, 1.0]);
        assert!(matches!(bad, Err(DataError::NonFiniteData { row: 0, col: 1, .. })));

        let unordered = TimeseriesDataset::new(array![[1.0, 2.0]], (0.0, 1.0), array![1.0, 1.0]);
        assert_eq!(unordered.unwrap_err(), DataError::NonMonotonicTimes { index: 1 });

        let uncovered = TimeseriesDataset::new(array![[1.0, 2.0]], (0.5, 1.0), array![0.0, 1.0]);
        assert!(matches!(uncovered, Err(DataError::InvalidTspan { .. })));
    }

    #[test]
    // Purpose
    // -------
    // A window borrows exactly the requested prefix and reports a span that
    // starts at the dataset origin.
    //
    // Given
    // -----
    // - A 2 x 5 daily dataset starting at t = 0.
    //
    // Expect
    // ------
    // - `window(3)` has 3 columns, last time 2.0 and span (0, 2).
    fn window_borrows_prefix() {
        // Arrange
        let ds = two_by_five();

        // Act
        let view = ds.window(3).expect("window within bounds");

        // Assert
        assert_eq!(view.len(), 3);
        assert_eq!(view.data(), ds.data().slice(s![.., ..3]));
        assert_eq!(view.tspan(), (0.0, 2.0));
        assert!(matches!(ds.window(6), Err(DataError::WindowOutOfRange { requested: 6, .. })));
        assert_eq!(ds.window(0).unwrap_err(), DataError::EmptyWindow);
    }

    #[test]
    fn slice_keeps_origin_of_parent() {
        let ds = two_by_five();
        let batch = ds.window(5).unwrap().slice(2..4).unwrap();
        assert_eq!(batch.tsteps(), array![2.0, 3.0]);
        assert_eq!(batch.tspan(), (0.0, 3.0));
    }

    #[test]
    fn split_produces_adjacent_datasets() {
        let ds = two_by_five();
        let (train, test) = ds.split(3).expect("valid split");
        assert_eq!(train.len(), 3);
        assert_eq!(test.len(), 2);
        assert_eq!(train.tspan(), (0.0, 2.0));
        assert_eq!(test.tspan(), (2.0, 4.0));
        assert_eq!(test.data(), array![[4.0, 5.0], [40.0, 50.0]]);
        assert!(matches!(ds.split(5), Err(DataError::InvalidSplit { .. })));
    }
}

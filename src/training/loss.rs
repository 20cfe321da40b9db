//! Loss evaluation over a training window.
//!
//! Purpose
//! -------
//! Turn a parameter vector into a scalar training loss: predict the observed
//! variables over one batch of a dataset window and compare them with the
//! batch's ground truth through a [`LossMetric`].
//!
//! Key behaviors
//! -------------
//! - [`BatchLoss`] is the shared, `Sync` core. It scores an arbitrary index
//!   range of the window and never fails: predictor failures, shape
//!   mismatches and `NaN` metric values all become `+∞`.
//! - [`LossEvaluator`] adds a [`CyclicBatches`] cursor. Each
//!   [`evaluate`](LossEvaluator::evaluate) scores the current batch and moves
//!   to the next one, wrapping after the last.
//! - [`LossEvaluator::probe`] re-scores the batch served last without moving
//!   the cursor. Finite-difference gradients and stage seeding go through it
//!   so they see the same batch as the loss value they refine.
//!
//! Invariants & assumptions
//! ------------------------
//! - A batch over steps `[a, b)` of the window is integrated over
//!   `(origin, tsteps[b - 1])` and observed at `tsteps[a..b]`; `origin`
//!   defaults to the dataset's `tspan.0`.
//! - The window always starts at step 0 of the dataset and is a view; the
//!   dataset is never copied.
use std::{
    cell::{Cell, RefCell},
    ops::Range,
    sync::Arc,
};

use tracing::trace;

use crate::{
    data::{CyclicBatches, DataResult, TimeseriesDataset},
    optimization::{Objective, Theta},
    training::{metrics::LossMetric, predictor::Predictor},
};

/// Side-effect free loss over a fixed data range, shareable across threads.
pub type EvalLoss = Arc<dyn Fn(&Theta) -> f64 + Send + Sync>;

#[derive(Debug)]
pub struct BatchLoss<P: ?Sized> {
    dataset: Arc<TimeseriesDataset>,
    window_len: usize,
    origin: f64,
    metric: LossMetric,
    predictor: Arc<P>,
}

impl<P: Predictor + ?Sized> BatchLoss<P> {
    /// Score the first `window_len` steps of `dataset` with `metric`.
    ///
    /// Errors
    /// ------
    /// - `DataError::EmptyWindow` / `DataError::WindowOutOfRange` when the
    ///   window does not fit the dataset.
    pub fn new(
        predictor: Arc<P>, dataset: Arc<TimeseriesDataset>, window_len: usize, metric: LossMetric,
    ) -> DataResult<Self> {
        dataset.window(window_len)?;
        let origin = dataset.tspan().0;
        Ok(Self { dataset, window_len, origin, metric, predictor })
    }

    /// Integrate from `origin` instead of the dataset's start.
    ///
    /// Used for held-out data whose initial state lives at the start of the
    /// training data.
    pub fn with_origin(mut self, origin: f64) -> Self {
        self.origin = origin;
        self
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }

    pub fn dataset(&self) -> &Arc<TimeseriesDataset> {
        &self.dataset
    }

    /// Loss of `theta` on steps `range` of the window.
    pub fn score(&self, theta: &Theta, range: Range<usize>) -> f64 {
        let batch = match self.dataset.window(self.window_len).and_then(|w| w.slice(range)) {
            Ok(batch) => batch,
            Err(err) => {
                trace!(error = %err, "batch outside the training window");
                return f64::INFINITY;
            }
        };
        let tspan = (self.origin, batch.tspan().1);
        let truth = batch.data();
        let pred = match self.predictor.predict(theta.view(), tspan, batch.tsteps()) {
            Ok(pred) => pred,
            Err(err) => {
                trace!(error = %err, "prediction failed; loss is +inf");
                return f64::INFINITY;
            }
        };
        if pred.dim() != truth.dim() {
            trace!(pred = ?pred.dim(), truth = ?truth.dim(), "trajectory shape mismatch; loss is +inf");
            return f64::INFINITY;
        }
        let loss = self.metric.score(pred.view(), truth, theta, batch.tsteps());
        if loss.is_nan() { f64::INFINITY } else { loss }
    }

    /// Loss of `theta` on the whole window.
    pub fn full(&self, theta: &Theta) -> f64 {
        self.score(theta, 0..self.window_len)
    }
}

impl<P: Predictor + ?Sized + 'static> BatchLoss<P> {
    /// Whole-window loss as a shareable closure, for evaluation and test
    /// losses.
    pub fn full_window_fn(self: &Arc<Self>) -> EvalLoss {
        let core = Arc::clone(self);
        Arc::new(move |theta: &Theta| core.full(theta))
    }
}

/// Predictor, observed data and metric of one fitting problem.
pub struct FitTarget<P: ?Sized> {
    pub predictor: Arc<P>,
    pub dataset: Arc<TimeseriesDataset>,
    pub metric: LossMetric,
}

impl<P: ?Sized> Clone for FitTarget<P> {
    fn clone(&self) -> Self {
        Self {
            predictor: Arc::clone(&self.predictor),
            dataset: Arc::clone(&self.dataset),
            metric: self.metric.clone(),
        }
    }
}

impl<P: Predictor + ?Sized> FitTarget<P> {
    pub fn new(predictor: Arc<P>, dataset: Arc<TimeseriesDataset>, metric: LossMetric) -> Self {
        Self { predictor, dataset, metric }
    }

    /// Loss core over the first `window_len` steps.
    pub fn batch_loss(&self, window_len: usize) -> DataResult<BatchLoss<P>> {
        BatchLoss::new(Arc::clone(&self.predictor), Arc::clone(&self.dataset), window_len, self.metric.clone())
    }
}

/// Training loss with a cyclic batch cursor.
///
/// Not `Sync`: one evaluator belongs to one training task.
pub struct LossEvaluator<P: ?Sized> {
    core: Arc<BatchLoss<P>>,
    batches: RefCell<CyclicBatches>,
    last: Cell<Option<usize>>,
}

impl<P: Predictor + ?Sized> LossEvaluator<P> {
    /// `batch_size == 0` (or larger than the window) means one batch
    /// spanning the window.
    pub fn new(core: Arc<BatchLoss<P>>, batch_size: usize) -> Self {
        let batches = CyclicBatches::new(core.window_len(), batch_size);
        Self { core, batches: RefCell::new(batches), last: Cell::new(None) }
    }

    pub fn core(&self) -> &Arc<BatchLoss<P>> {
        &self.core
    }

    pub fn n_batches(&self) -> usize {
        self.batches.borrow().len()
    }

    /// Score the current batch and advance the cursor.
    pub fn evaluate(&self, theta: &Theta) -> f64 {
        let (index, range) = {
            let mut batches = self.batches.borrow_mut();
            let index = batches.position();
            (index, batches.advance())
        };
        self.last.set(Some(index));
        self.core.score(theta, range)
    }

    /// Score the most recently served batch (or the upcoming one before the
    /// first `evaluate`) without moving the cursor.
    pub fn probe(&self, theta: &Theta) -> f64 {
        let range = {
            let batches = self.batches.borrow();
            match self.last.get() {
                Some(index) => batches.range(index),
                None => batches.peek(),
            }
        };
        self.core.score(theta, range)
    }

    /// Index of the batch the next `evaluate` will score.
    pub fn position(&self) -> usize {
        self.batches.borrow().position()
    }

    /// Restore a saved cursor position.
    pub fn seek(&self, position: usize) {
        self.batches.borrow_mut().seek(position);
        self.last.set(None);
    }
}

impl<P: Predictor + ?Sized> Objective for LossEvaluator<P> {
    fn value(&self, theta: &Theta) -> f64 {
        self.evaluate(theta)
    }

    fn probe(&self, theta: &Theta) -> f64 {
        LossEvaluator::probe(self, theta)
    }
}

//! Training loss metrics.
//!
//! A [`LossMetric`] compares a predicted trajectory with the ground-truth
//! slice of a batch. Two signatures are supported behind one type:
//!
//! - `Plain(pred, truth)`;
//! - `Regularized(pred, truth, θ, tsteps)`, for penalties on the parameters
//!   or weights over the batch's output times.
//!
//! Metrics may return any `f64`; the loss evaluator maps `NaN` to `+∞`.
use std::{fmt, sync::Arc};

use ndarray::{ArrayView1, ArrayView2, Zip};

use crate::optimization::Theta;

pub type PlainFn = dyn Fn(ArrayView2<'_, f64>, ArrayView2<'_, f64>) -> f64 + Send + Sync;
pub type RegularizedFn =
    dyn Fn(ArrayView2<'_, f64>, ArrayView2<'_, f64>, &Theta, ArrayView1<'_, f64>) -> f64 + Send + Sync;

#[derive(Clone)]
pub enum LossMetric {
    Plain(Arc<PlainFn>),
    Regularized(Arc<RegularizedFn>),
}

impl fmt::Debug for LossMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossMetric::Plain(_) => f.write_str("LossMetric::Plain(..)"),
            LossMetric::Regularized(_) => f.write_str("LossMetric::Regularized(..)"),
        }
    }
}

impl LossMetric {
    pub fn plain<F>(f: F) -> Self
    where
        F: Fn(ArrayView2<'_, f64>, ArrayView2<'_, f64>) -> f64 + Send + Sync + 'static,
    {
        LossMetric::Plain(Arc::new(f))
    }

    pub fn regularized<F>(f: F) -> Self
    where
        F: Fn(ArrayView2<'_, f64>, ArrayView2<'_, f64>, &Theta, ArrayView1<'_, f64>) -> f64
            + Send
            + Sync
            + 'static,
    {
        LossMetric::Regularized(Arc::new(f))
    }

    /// Mean squared error over all entries.
    pub fn mse() -> Self {
        Self::plain(|pred, truth| mean_of(pred, truth, |d| d * d))
    }

    /// Mean absolute error over all entries.
    pub fn mae() -> Self {
        Self::plain(|pred, truth| mean_of(pred, truth, f64::abs))
    }

    /// Sum of squared errors.
    pub fn sse() -> Self {
        Self::plain(|pred, truth| {
            let mut acc = 0.0;
            Zip::from(pred).and(truth).for_each(|&p, &t| acc += (p - t) * (p - t));
            acc
        })
    }

    /// Time-weighted sum of squared errors, `Σ (ŷ − y)² · exp(−ζ (t − t₀))`
    /// with `t₀` the first output time of the batch. `ζ > 0` discounts late
    /// observations.
    pub fn exp_decay_sse(zeta: f64) -> Self {
        Self::regularized(move |pred, truth, _theta, tsteps| {
            let t0 = tsteps.first().copied().unwrap_or(0.0);
            let mut acc = 0.0;
            for (j, column) in pred.columns().into_iter().enumerate() {
                let weight = (-zeta * (tsteps[j] - t0)).exp();
                let sq: f64 = column.iter().zip(truth.column(j)).map(|(p, t)| (p - t) * (p - t)).sum();
                acc += weight * sq;
            }
            acc
        })
    }

    /// Add `λ ‖θ‖²` to this metric.
    pub fn with_l2_penalty(self, lambda: f64) -> Self {
        Self::regularized(move |pred, truth, theta, tsteps| {
            self.score(pred, truth, theta, tsteps) + lambda * theta.dot(theta)
        })
    }

    /// Evaluate on shape-checked inputs.
    pub fn score(
        &self, pred: ArrayView2<'_, f64>, truth: ArrayView2<'_, f64>, theta: &Theta,
        tsteps: ArrayView1<'_, f64>,
    ) -> f64 {
        match self {
            LossMetric::Plain(f) => f(pred, truth),
            LossMetric::Regularized(f) => f(pred, truth, theta, tsteps),
        }
    }
}

fn mean_of(pred: ArrayView2<'_, f64>, truth: ArrayView2<'_, f64>, f: impl Fn(f64) -> f64) -> f64 {
    let n = pred.len();
    if n == 0 {
        return f64::INFINITY;
    }
    let mut acc = 0.0;
    Zip::from(pred).and(truth).for_each(|&p, &t| acc += f(p - t));
    acc / n as f64
}

//! Multi-horizon forecast evaluation.
//!
//! Purpose
//! -------
//! Score a fitted parameter vector on held-out data: predict from the start
//! of the training data over the test time steps and, for every
//! `(horizon, metric, observed variable)`, compare the first `horizon` test
//! steps with the ground truth.
//!
//! Domain policy
//! -------------
//! Every metric returns `+∞` instead of `NaN`:
//! - on empty or length-mismatched inputs;
//! - MAPE, when any ground-truth value is zero;
//! - RMSLE, when any value (prediction or truth) is negative, since it uses
//!   `ln(1 + x)`.
//!
//! A prediction failure scores `+∞` for every cell of the table.
use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    data::TimeseriesDataset,
    experiment::errors::{EvalError, EvalResult},
    optimization::Theta,
    training::Predictor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMetric {
    Mae,
    Mape,
    Rmse,
    Rmsle,
}

impl ForecastMetric {
    pub const ALL: [ForecastMetric; 4] =
        [ForecastMetric::Mae, ForecastMetric::Mape, ForecastMetric::Rmse, ForecastMetric::Rmsle];

    pub fn name(&self) -> &'static str {
        match self {
            ForecastMetric::Mae => "mae",
            ForecastMetric::Mape => "mape",
            ForecastMetric::Rmse => "rmse",
            ForecastMetric::Rmsle => "rmsle",
        }
    }

    pub fn score(&self, pred: &[f64], truth: &[f64]) -> f64 {
        match self {
            ForecastMetric::Mae => mae(pred, truth),
            ForecastMetric::Mape => mape(pred, truth),
            ForecastMetric::Rmse => rmse(pred, truth),
            ForecastMetric::Rmsle => rmsle(pred, truth),
        }
    }
}

fn mean_of(pred: &[f64], truth: &[f64], f: impl Fn(f64, f64) -> f64) -> f64 {
    if pred.is_empty() || pred.len() != truth.len() {
        return f64::INFINITY;
    }
    let total: f64 = pred.iter().zip(truth).map(|(&p, &t)| f(p, t)).sum();
    finite_or_inf(total / pred.len() as f64)
}

/// Non-finite scores (NaN from NaN inputs, overflow) report as `+∞`.
fn finite_or_inf(value: f64) -> f64 {
    if value.is_finite() { value } else { f64::INFINITY }
}

/// Mean absolute error.
pub fn mae(pred: &[f64], truth: &[f64]) -> f64 {
    mean_of(pred, truth, |p, t| (p - t).abs())
}

/// Mean absolute percentage error, as a fraction (not multiplied by 100).
pub fn mape(pred: &[f64], truth: &[f64]) -> f64 {
    if truth.contains(&0.0) {
        return f64::INFINITY;
    }
    mean_of(pred, truth, |p, t| ((p - t) / t).abs())
}

/// Root mean squared error.
pub fn rmse(pred: &[f64], truth: &[f64]) -> f64 {
    finite_or_inf(mean_of(pred, truth, |p, t| (p - t) * (p - t)).sqrt())
}

/// Root mean squared log error on `ln(1 + x)`.
pub fn rmsle(pred: &[f64], truth: &[f64]) -> f64 {
    if pred.iter().chain(truth).any(|&x| x < 0.0) {
        return f64::INFINITY;
    }
    finite_or_inf(
        mean_of(pred, truth, |p, t| {
            let d = p.ln_1p() - t.ln_1p();
            d * d
        })
        .sqrt(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRow {
    pub horizon: usize,
    pub metric: ForecastMetric,
    /// One value per observed variable, in label order.
    pub values: Vec<f64>,
}

/// Errors keyed by `(horizon, metric)`, one column per label.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorTable {
    pub labels: Vec<String>,
    pub rows: Vec<ErrorRow>,
}

impl ErrorTable {
    pub fn get(&self, horizon: usize, metric: ForecastMetric) -> Option<&[f64]> {
        self.rows
            .iter()
            .find(|row| row.horizon == horizon && row.metric == metric)
            .map(|row| row.values.as_slice())
    }

    /// Write as CSV with header `horizon,metric,<labels…>`.
    pub fn write_csv(&self, path: &Path) -> EvalResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| EvalError::Io { path: parent.to_path_buf(), source })?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        let mut header = vec!["horizon".to_string(), "metric".to_string()];
        header.extend(self.labels.iter().cloned());
        writer.write_record(&header)?;
        for row in &self.rows {
            let mut record = vec![row.horizon.to_string(), row.metric.name().to_string()];
            record.extend(row.values.iter().map(f64::to_string));
            writer.write_record(&record)?;
        }
        writer.flush().map_err(|source| EvalError::Io { path: path.to_path_buf(), source })?;
        Ok(())
    }
}

/// Build the error table of `theta` on `test`.
///
/// The forecast is integrated from `train.tspan().0` to the last test step
/// and observed at the test time steps.
///
/// Errors
/// ------
/// - [`EvalError::LabelMismatch`] unless there is one label per test
///   variable.
/// - [`EvalError::HorizonOutOfRange`] for a zero horizon or one longer than
///   the test set.
pub fn evaluate<P: Predictor + ?Sized>(
    predictor: &P, theta: &Theta, train: &TimeseriesDataset, test: &TimeseriesDataset,
    metrics: &[ForecastMetric], horizons: &[usize], labels: &[String],
) -> EvalResult<ErrorTable> {
    let variables = test.n_vars();
    if labels.len() != variables {
        return Err(EvalError::LabelMismatch { labels: labels.len(), variables });
    }
    let available = test.len();
    if let Some(&horizon) = horizons.iter().find(|&&h| h == 0 || h > available) {
        return Err(EvalError::HorizonOutOfRange { horizon, available });
    }

    let tspan = (train.tspan().0, test.tspan().1);
    let truth = test.data();
    let prediction = match predictor.predict(theta.view(), tspan, test.tsteps()) {
        Ok(pred) if pred.dim() == truth.dim() => Some(pred),
        Ok(pred) => {
            warn!(pred = ?pred.dim(), truth = ?truth.dim(), "forecast shape mismatch; scoring +inf");
            None
        }
        Err(err) => {
            warn!(error = %err, "forecast failed; scoring +inf");
            None
        }
    };

    let mut rows = Vec::with_capacity(horizons.len() * metrics.len());
    for &horizon in horizons {
        for &metric in metrics {
            let values = (0..variables)
                .map(|i| match &prediction {
                    Some(pred) => {
                        let p = pred.row(i).iter().take(horizon).copied().collect::<Vec<_>>();
                        let t = truth.row(i).iter().take(horizon).copied().collect::<Vec<_>>();
                        metric.score(&p, &t)
                    }
                    None => f64::INFINITY,
                })
                .collect();
            rows.push(ErrorRow { horizon, metric, values });
        }
    }
    Ok(ErrorTable { labels: labels.to_vec(), rows })
}

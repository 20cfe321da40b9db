//! Curriculum scheduler ("growing fit").
//!
//! Purpose
//! -------
//! Fit stiff dynamics over a short prefix of the data first, then widen the
//! training window step by step, re-running the stage sequence at every
//! width from the parameters the previous width produced.
//!
//! Key behaviors
//! -------------
//! - Windows are `w0, w0 + Δw, …`, clamped so the last one is exactly the
//!   horizon `W` (which is always visited).
//! - Each window gets a fresh [`LossEvaluator`] over the first `w` steps and
//!   every stage of that window the budget `base_iters + iters_per_step · w`.
//! - After each window an optional frame of the current fit is rendered
//!   under the renderer lock; render failures are logged, not fatal.
//! - Optional `final_stages` run once on the full horizon with their own
//!   budgets.
//! - Cancellation is checked before every window.
//!
//! Invariants & assumptions
//! ------------------------
//! - The window-`w` run only sees steps `[0, w)` of the dataset.
//! - Window `k + 1` starts from window `k`'s final parameters.
//! - Checkpoint blobs of window `w` carry the prefix `w{w}_`; those of the
//!   final stages carry `final_`.
use std::sync::{Arc, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::{
    experiment::render::{FitFrame, SharedRenderer},
    optimization::Theta,
    training::{
        callback::{BestBy, LossHistory},
        errors::{TrainingError, TrainingResult},
        loss::{EvalLoss, FitTarget, LossEvaluator},
        predictor::Predictor,
        session::{SessionOutcome, SessionSequencer, StageReport, TrainingStage},
    },
};

/// Window schedule and per-window budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurriculumConfig {
    /// First window length `w0`.
    pub initial_window: usize,
    /// Growth `Δw` between windows.
    pub window_step: usize,
    /// Full horizon `W`; the whole dataset when `None`.
    pub horizon: Option<usize>,
    pub base_iters: usize,
    pub iters_per_step: usize,
    /// Batch size of every window's evaluator; `0` means one batch per
    /// window.
    pub batch_size: usize,
}

impl Default for CurriculumConfig {
    fn default() -> Self {
        Self {
            initial_window: 10,
            window_step: 10,
            horizon: None,
            base_iters: 50,
            iters_per_step: 2,
            batch_size: 0,
        }
    }
}

impl CurriculumConfig {
    /// Window lengths for a dataset of `available` steps.
    ///
    /// Errors
    /// ------
    /// - [`TrainingError::InvalidCurriculum`] for a zero initial window, a
    ///   zero step that would never reach the horizon, a horizon of zero or
    ///   longer than the data, or a zero budget.
    pub fn windows(&self, available: usize) -> TrainingResult<Vec<usize>> {
        let invalid = |reason: String| Err(TrainingError::InvalidCurriculum { reason });
        let horizon = self.horizon.unwrap_or(available);
        if horizon == 0 || horizon > available {
            return invalid(format!("horizon {horizon} must lie in 1..={available}"));
        }
        if self.initial_window == 0 {
            return invalid("initial_window must be positive".to_string());
        }
        if self.window_step == 0 && self.initial_window < horizon {
            return invalid("window_step must be positive".to_string());
        }
        if self.base_iters == 0 && self.iters_per_step == 0 {
            return invalid("base_iters and iters_per_step cannot both be zero".to_string());
        }

        let mut windows = Vec::new();
        let mut w = self.initial_window.min(horizon);
        loop {
            windows.push(w);
            if w == horizon {
                return Ok(windows);
            }
            w = w.saturating_add(self.window_step).min(horizon);
        }
    }

    /// Iteration budget of every stage in window `w`, saturating at
    /// `usize::MAX`.
    pub fn budget(&self, w: usize) -> usize {
        self.base_iters.saturating_add(self.iters_per_step.saturating_mul(w))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowReport {
    pub window: usize,
    pub budget: usize,
    pub best_loss: f64,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurriculumOutcome {
    pub params: Theta,
    pub best_loss: f64,
    /// Histories of every window, then of the final stages, in run order.
    pub history: LossHistory,
    pub windows: Vec<WindowReport>,
    pub final_reports: Vec<StageReport>,
}

pub struct CurriculumScheduler {
    sequencer: SessionSequencer,
    config: CurriculumConfig,
    renderer: Option<(SharedRenderer, String)>,
}

impl CurriculumScheduler {
    /// `sequencer` provides the checkpoint directory, checkpoint settings and
    /// cancellation token; its prefix is extended per window.
    pub fn new(sequencer: SessionSequencer, config: CurriculumConfig) -> Self {
        Self { sequencer, config, renderer: None }
    }

    /// Render a frame labelled `label` after every window.
    pub fn with_renderer(mut self, renderer: SharedRenderer, label: impl Into<String>) -> Self {
        self.renderer = Some((renderer, label.into()));
        self
    }

    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }

    /// Fit `dataset` window by window from `theta0`.
    ///
    /// Errors
    /// ------
    /// - [`TrainingError::Cancelled`] when the token is set before a window
    ///   or inside one.
    /// - [`TrainingError::InvalidCurriculum`] for an unusable schedule.
    /// - Any fatal error of the session sequencer.
    pub fn run<P: Predictor + ?Sized + 'static>(
        &self, target: &FitTarget<P>, test_loss: Option<&EvalLoss>, theta0: Theta,
        stages: &[TrainingStage], final_stages: &[TrainingStage],
    ) -> TrainingResult<CurriculumOutcome> {
        let windows = self.config.windows(target.dataset.len())?;
        let horizon = windows.last().copied().unwrap_or(target.dataset.len());
        let cancel = self.sequencer.cancel_token();

        let mut params = theta0;
        let mut best_loss = f64::INFINITY;
        let mut history = LossHistory::default();
        let mut reports = Vec::with_capacity(windows.len());

        for w in windows {
            if cancel.is_cancelled() {
                return Err(TrainingError::Cancelled);
            }
            let _span = info_span!("window", w).entered();
            let budget = self.config.budget(w);
            let window_stages: Vec<TrainingStage> = stages.iter().map(|s| s.with_max_iters(budget)).collect();

            let prefix = format!("w{w}_");
            let outcome = self.fit_window(target, test_loss, w, params, &window_stages, &prefix)?;
            params = outcome.params;
            best_loss = outcome.best_loss;
            history.extend(outcome.history);
            info!(window = w, budget, best_loss, "window finished");
            self.render(w, target, &params);
            reports.push(WindowReport { window: w, budget, best_loss, stages: outcome.reports });
        }

        let mut final_reports = Vec::new();
        if !final_stages.is_empty() {
            if cancel.is_cancelled() {
                return Err(TrainingError::Cancelled);
            }
            let _span = info_span!("final", horizon).entered();
            let outcome = self.fit_window(target, test_loss, horizon, params, final_stages, "final_")?;
            params = outcome.params;
            best_loss = outcome.best_loss;
            history.extend(outcome.history);
            final_reports = outcome.reports;
            info!(horizon, best_loss, "final stages finished");
        }

        Ok(CurriculumOutcome { params, best_loss, history, windows: reports, final_reports })
    }

    fn fit_window<P: Predictor + ?Sized + 'static>(
        &self, target: &FitTarget<P>, test_loss: Option<&EvalLoss>, w: usize, params: Theta,
        stages: &[TrainingStage], prefix: &str,
    ) -> TrainingResult<SessionOutcome> {
        let core = Arc::new(target.batch_loss(w)?);
        let evaluator = LossEvaluator::new(Arc::clone(&core), self.config.batch_size);
        let by_eval = self.sequencer.config().best_by == BestBy::EvalLoss;
        let eval_loss = (by_eval || evaluator.n_batches() > 1).then(|| core.full_window_fn());

        let sequencer = self.sequencer.clone().with_prefix(format!("{}{prefix}", self.sequencer.prefix()));
        sequencer.run(&evaluator, eval_loss.as_ref(), test_loss, params, stages)
    }

    fn render<P: Predictor + ?Sized>(&self, w: usize, target: &FitTarget<P>, params: &Theta) {
        let Some((renderer, label)) = &self.renderer else {
            return;
        };
        let mut guard = renderer.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = FitFrame::capture(label, w, target.predictor.as_ref(), &target.dataset, params);
        if let Err(err) = guard.render(&frame) {
            warn!(window = w, error = %err, "could not render fit frame");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        experiment::render::{FrameRecorder, shared},
        optimization::{NelderMeadConfig, StageOptimizer},
        data::TimeseriesDataset,
        training::{
            callback::CheckpointConfig, cancel::CancelToken, metrics::LossMetric, predictor::FnPredictor,
        },
    };
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, ArrayView1, array};
    use std::sync::Mutex;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Window schedules and budgets, the window restriction and parameter
    // hand-off of `CurriculumScheduler::run`, final stages, rendering and
    // cancellation.
    // -------------------------------------------------------------------------

    #[test]
    fn windows_grow_and_end_at_horizon() {
        let config = CurriculumConfig { initial_window: 3, window_step: 2, ..Default::default() };
        assert_eq!(config.windows(8).expect("valid"), vec![3, 5, 7, 8]);
        assert_eq!(config.windows(7).expect("valid"), vec![3, 5, 7]);

        let capped = CurriculumConfig { horizon: Some(6), ..config.clone() };
        assert_eq!(capped.windows(8).expect("valid"), vec![3, 5, 6]);

        let wide = CurriculumConfig { initial_window: 20, window_step: 0, ..config.clone() };
        assert_eq!(wide.windows(8).expect("valid"), vec![8]);
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        let base = CurriculumConfig { initial_window: 3, window_step: 2, ..Default::default() };
        for bad in [
            CurriculumConfig { initial_window: 0, ..base.clone() },
            CurriculumConfig { window_step: 0, ..base.clone() },
            CurriculumConfig { horizon: Some(9), ..base.clone() },
            CurriculumConfig { base_iters: 0, iters_per_step: 0, ..base.clone() },
        ] {
            assert!(matches!(bad.windows(8), Err(TrainingError::InvalidCurriculum { .. })));
        }
    }

    #[test]
    fn budget_grows_with_window() {
        let config = CurriculumConfig { base_iters: 10, iters_per_step: 3, ..Default::default() };
        assert_eq!(config.budget(4), 22);
    }

    #[test]
    // Purpose
    // -------
    // Huge budgets and steps saturate instead of overflowing.
    fn budget_and_step_saturate() {
        let config = CurriculumConfig {
            initial_window: 2,
            window_step: usize::MAX,
            base_iters: usize::MAX - 1,
            iters_per_step: usize::MAX / 2,
            ..Default::default()
        };
        assert_eq!(config.budget(0), usize::MAX - 1);
        assert_eq!(config.budget(3), usize::MAX);
        assert_eq!(config.windows(5).expect("valid"), vec![2, 5]);
    }

    /// Level predictor that records the last output time of every call.
    fn recording_predictor() -> (Arc<impl Predictor>, Arc<Mutex<Vec<f64>>>) {
        let seen: Arc<Mutex<Vec<f64>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let predictor = FnPredictor::new(1, move |theta: ArrayView1<'_, f64>, _, tsteps: ArrayView1<'_, f64>| {
            let last = tsteps[tsteps.len() - 1];
            sink.lock().expect("poisoned").push(last);
            Ok(Array2::from_elem((1, tsteps.len()), theta[0]))
        });
        (Arc::new(predictor), seen)
    }

    fn simplex_stage() -> Vec<TrainingStage> {
        vec![TrainingStage::new("simplex", StageOptimizer::NelderMead(NelderMeadConfig::default()), 1)]
    }

    #[test]
    // Purpose
    // -------
    // Each window only sees its prefix of the data and starts from the
    // previous window's parameters.
    //
    // Given
    // -----
    // - 6 daily steps of the constant 10, a level predictor and MAE.
    // - Windows 2, 4, 6 with one Nelder–Mead stage each.
    //
    // Expect
    // ------
    // - Every prediction during window w ends at time w - 1, and windows are
    //   visited in order.
    // - Window k + 1 starts at window k's best loss (same loss on any
    //   prefix of constant data).
    // - Budgets follow base + per-step · w.
    fn windows_restrict_data_and_hand_off_parameters() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = Arc::new(TimeseriesDataset::from_daily(Array2::from_elem((1, 6), 10.0), 0.0).expect("dataset"));
        let (predictor, seen) = recording_predictor();
        let config = CurriculumConfig {
            initial_window: 2,
            window_step: 2,
            horizon: None,
            base_iters: 4,
            iters_per_step: 1,
            batch_size: 0,
        };
        let sequencer = SessionSequencer::new(dir.path(), CheckpointConfig::default(), CancelToken::new());
        let scheduler = CurriculumScheduler::new(sequencer, config);

        // Act
        let outcome = scheduler
            .run(&FitTarget::new(predictor, dataset, LossMetric::mae()), None, array![0.0], &simplex_stage(), &[])
            .expect("curriculum runs");

        // Assert
        let seen = seen.lock().expect("poisoned");
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        let mut distinct: Vec<f64> = seen.clone();
        distinct.dedup();
        assert_eq!(distinct, vec![1.0, 3.0, 5.0]);

        let windows: Vec<usize> = outcome.windows.iter().map(|r| r.window).collect();
        assert_eq!(windows, vec![2, 4, 6]);
        let budgets: Vec<usize> = outcome.windows.iter().map(|r| r.budget).collect();
        assert_eq!(budgets, vec![6, 8, 10]);
        for pair in outcome.windows.windows(2) {
            assert_abs_diff_eq!(pair[1].stages[0].start_loss, pair[0].best_loss, epsilon = 1e-12);
        }
        assert!(outcome.best_loss < 10.0);
        assert!(dir.path().join("w4_simplex.params.bin").exists());
        assert!(outcome.final_reports.is_empty());
    }

    #[test]
    // Purpose
    // -------
    // Final stages run on the full horizon with their own budget, and one
    // frame is rendered per window.
    fn final_stages_and_frames() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = Arc::new(TimeseriesDataset::from_daily(Array2::from_elem((1, 4), 3.0), 0.0).expect("dataset"));
        let (predictor, seen) = recording_predictor();
        let config = CurriculumConfig {
            initial_window: 2,
            window_step: 2,
            base_iters: 3,
            iters_per_step: 0,
            ..Default::default()
        };
        let frames = dir.path().join("frames.jsonl");
        let scheduler = CurriculumScheduler::new(
            SessionSequencer::new(dir.path(), CheckpointConfig::default(), CancelToken::new()),
            config,
        )
        .with_renderer(shared(FrameRecorder::new(&frames)), "loc");
        let final_stage = vec![TrainingStage::new("polish", StageOptimizer::NelderMead(NelderMeadConfig::default()), 7)];

        // Act
        let outcome = scheduler
            .run(&FitTarget::new(predictor, dataset, LossMetric::mse()), None, array![1.0], &simplex_stage(), &final_stage)
            .expect("curriculum runs");

        // Assert
        assert_eq!(outcome.windows.len(), 2);
        assert_eq!(outcome.final_reports.len(), 1);
        assert!(outcome.final_reports[0].iterations <= 7);
        assert!(dir.path().join("final_polish.losses.bin").exists());
        let lines = std::fs::read_to_string(&frames).expect("frames").lines().count();
        assert_eq!(lines, 2);
        assert_eq!(seen.lock().expect("poisoned").last(), Some(&3.0));
    }

    #[test]
    fn cancellation_stops_before_first_window() {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = Arc::new(TimeseriesDataset::from_daily(Array2::from_elem((1, 4), 1.0), 0.0).expect("dataset"));
        let (predictor, seen) = recording_predictor();
        let cancel = CancelToken::new();
        cancel.cancel();
        let scheduler = CurriculumScheduler::new(
            SessionSequencer::new(dir.path(), CheckpointConfig::default(), cancel),
            CurriculumConfig { initial_window: 2, window_step: 1, ..Default::default() },
        );

        let err = scheduler
            .run(&FitTarget::new(predictor, dataset, LossMetric::mae()), None, array![0.0], &simplex_stage(), &[])
            .unwrap_err();

        assert!(err.is_cancellation());
        assert!(seen.lock().expect("poisoned").is_empty());
    }
}

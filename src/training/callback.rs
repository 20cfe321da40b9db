//! Checkpointing callback: best-so-far tracking and durable progress.
//!
//! Purpose
//! -------
//! Observe one optimizer stage iteration by iteration. The callback keeps the
//! best parameters seen so far, appends losses to a history, persists both at
//! configurable intervals and drives a progress bar.
//!
//! Key behaviors
//! -------------
//! Every call to [`CheckpointCallback::step`] runs, in order:
//! 1. the evaluation loss, if one is configured;
//! 2. the best-so-far update, using the loss selected by [`BestBy`] and a
//!    strictly-less comparison (ties keep the earlier point);
//! 3. the iteration increment;
//! 4. every `loss_interval` iterations, a history append and persist;
//! 5. every `param_interval` iterations, a persist of `best_params`;
//! 6. a progress update;
//! 7. `Ok(false)`: the callback never asks the optimizer to stop.
//!
//! Invariants & assumptions
//! ------------------------
//! - One [`CallbackState`] per stage. The sequencer builds a new callback at
//!   every stage boundary and only the best parameters cross it.
//! - Persistence errors propagate; there is no fallback storage.
//! - The optimizer always reports parameters of the seeded length. A length
//!   change is a programming error and panics.
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    optimization::{IterationCallback, Theta},
    training::{
        errors::{PersistError, TrainingError, TrainingResult},
        loss::EvalLoss,
        persistence::{save_history, save_params},
    },
};

/// Which loss decides whether a point is the new best.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BestBy {
    #[default]
    TrainLoss,
    EvalLoss,
}

/// Intervals and selection strategy shared by every stage of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Iterations between history appends (and history persists).
    pub loss_interval: usize,
    /// Iterations between best-parameter persists.
    pub param_interval: usize,
    pub show_progress: bool,
    pub best_by: BestBy,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self { loss_interval: 1, param_interval: 10, show_progress: false, best_by: BestBy::TrainLoss }
    }
}

impl CheckpointConfig {
    pub fn validate(&self) -> TrainingResult<()> {
        if self.loss_interval == 0 {
            return Err(TrainingError::InvalidCheckpoint { reason: "loss_interval must be positive" });
        }
        if self.param_interval == 0 {
            return Err(TrainingError::InvalidCheckpoint { reason: "param_interval must be positive" });
        }
        Ok(())
    }
}

/// Recorded losses, one entry per history append.
///
/// `eval` stays empty when no evaluation loss is configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub train: Vec<f64>,
    pub eval: Vec<f64>,
}

impl LossHistory {
    pub fn push(&mut self, train: f64, eval: Option<f64>) {
        self.train.push(train);
        if let Some(eval) = eval {
            self.eval.push(eval);
        }
    }

    /// Append `other` after the entries already recorded.
    pub fn extend(&mut self, other: LossHistory) {
        self.train.extend(other.train);
        self.eval.extend(other.eval);
    }

    pub fn len(&self) -> usize {
        self.train.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

/// Mutable state of one stage's callback.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackState {
    pub iteration: usize,
    pub best_loss: f64,
    pub best_params: Theta,
    pub history: LossHistory,
}

impl CallbackState {
    /// Start a stage from the carried-in point and its loss.
    pub fn seeded(params: Theta, loss: f64) -> Self {
        Self { iteration: 0, best_loss: loss, best_params: params, history: LossHistory::default() }
    }
}

/// Blob locations of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub losses: PathBuf,
    pub params: PathBuf,
}

impl CheckpointPaths {
    /// `<dir>/<prefix><stage>.losses.bin` and `<dir>/<prefix><stage>.params.bin`.
    pub fn for_stage(dir: &Path, prefix: &str, stage: &str) -> Self {
        Self {
            losses: dir.join(format!("{prefix}{stage}.losses.bin")),
            params: dir.join(format!("{prefix}{stage}.params.bin")),
        }
    }
}

pub struct CheckpointCallback {
    state: CallbackState,
    config: CheckpointConfig,
    paths: CheckpointPaths,
    eval_loss: Option<EvalLoss>,
    progress: ProgressBar,
}

impl CheckpointCallback {
    /// Errors
    /// ------
    /// - [`TrainingError::InvalidCheckpoint`] for zero intervals, or for
    ///   [`BestBy::EvalLoss`] without an evaluation loss.
    pub fn new(
        state: CallbackState, config: CheckpointConfig, paths: CheckpointPaths,
        eval_loss: Option<EvalLoss>, max_iters: usize,
    ) -> TrainingResult<Self> {
        config.validate()?;
        if config.best_by == BestBy::EvalLoss && eval_loss.is_none() {
            return Err(TrainingError::InvalidCheckpoint {
                reason: "best-by-eval selection needs an evaluation loss",
            });
        }
        let progress = if config.show_progress {
            let pb = ProgressBar::new(max_iters as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            pb
        } else {
            ProgressBar::hidden()
        };
        Ok(Self { state, config, paths, eval_loss, progress })
    }

    /// Record one completed optimizer iteration.
    ///
    /// Panics
    /// ------
    /// - If `params.len()` differs from the seeded parameter length.
    pub fn step(&mut self, params: &Theta, loss: f64) -> Result<bool, PersistError> {
        let eval = self.eval_loss.as_ref().map(|f| f(params));

        assert_eq!(
            params.len(),
            self.state.best_params.len(),
            "optimizer changed the parameter length mid-stage"
        );
        let candidate = match self.config.best_by {
            BestBy::TrainLoss => loss,
            BestBy::EvalLoss => eval.unwrap_or(f64::INFINITY),
        };
        if candidate < self.state.best_loss {
            self.state.best_loss = candidate;
            self.state.best_params.assign(params);
        }

        self.state.iteration += 1;
        let iteration = self.state.iteration;

        if iteration % self.config.loss_interval == 0 {
            self.state.history.push(loss, eval);
            save_history(&self.paths.losses, &self.state.history)?;
        }
        if iteration % self.config.param_interval == 0 {
            save_params(&self.paths.params, &self.state.best_params.to_vec())?;
            debug!(iteration, best_loss = self.state.best_loss, path = %self.paths.params.display(), "checkpointed best parameters");
        }

        self.progress.set_position(iteration as u64);
        self.progress.set_message(format!("loss {loss:.4e} best {:.4e}", self.state.best_loss));
        Ok(false)
    }

    /// Persist the history and best parameters as they stand at stage end.
    pub fn finish(&mut self) -> Result<(), PersistError> {
        self.progress.finish_and_clear();
        save_history(&self.paths.losses, &self.state.history)?;
        save_params(&self.paths.params, &self.state.best_params.to_vec())
    }

    pub fn state(&self) -> &CallbackState {
        &self.state
    }

    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    pub fn into_state(self) -> CallbackState {
        self.state
    }
}

impl IterationCallback for CheckpointCallback {
    type Error = PersistError;

    fn on_iteration(&mut self, theta: &Theta, loss: f64) -> Result<bool, PersistError> {
        self.step(theta, loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::persistence::{load_history, load_params};
    use ndarray::array;
    use std::sync::Arc;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // The per-call state machine of `CheckpointCallback`: strict best
    // updates, both selection strategies, persist intervals, error
    // propagation and the length-mismatch panic.
    // -------------------------------------------------------------------------

    fn callback(dir: &Path, config: CheckpointConfig, eval: Option<EvalLoss>) -> CheckpointCallback {
        CheckpointCallback::new(
            CallbackState::seeded(array![0.0, 0.0], 10.0),
            config,
            CheckpointPaths::for_stage(dir, "run_", "adam"),
            eval,
            100,
        )
        .expect("valid callback")
    }

    #[test]
    fn paths_follow_prefix_and_stage_name() {
        let paths = CheckpointPaths::for_stage(Path::new("out"), "w7_", "lbfgs");
        assert_eq!(paths.losses, Path::new("out/w7_lbfgs.losses.bin"));
        assert_eq!(paths.params, Path::new("out/w7_lbfgs.params.bin"));
    }

    #[test]
    // Purpose
    // -------
    // Best tracking uses a strictly-less comparison on the train loss and the
    // callback never requests a stop.
    //
    // Given
    // -----
    // - Seeded best loss 10 and losses 12, 10, 4, 4, 7.
    //
    // Expect
    // ------
    // - Only the loss-4 call at iteration 3 updates the best point; the tie
    //   at iteration 4 does not.
    fn best_update_is_strictly_less() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cb = callback(dir.path(), CheckpointConfig::default(), None);
        let steps = [
            (array![1.0, 1.0], 12.0),
            (array![2.0, 2.0], 10.0),
            (array![3.0, 3.0], 4.0),
            (array![4.0, 4.0], 4.0),
            (array![5.0, 5.0], 7.0),
        ];

        // Act
        let stops: Vec<bool> =
            steps.iter().map(|(theta, loss)| cb.step(theta, *loss).expect("persist")).collect();

        // Assert
        assert!(stops.iter().all(|stop| !stop));
        let state = cb.state();
        assert_eq!(state.iteration, 5);
        assert_eq!(state.best_loss, 4.0);
        assert_eq!(state.best_params, array![3.0, 3.0]);
        assert_eq!(state.history.train, vec![12.0, 10.0, 4.0, 4.0, 7.0]);
        assert!(state.history.eval.is_empty());
    }

    #[test]
    // Purpose
    // -------
    // History and parameter blobs are written on their own intervals and
    // `finish` flushes the final state.
    fn persists_on_intervals_and_on_finish() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let config = CheckpointConfig { loss_interval: 2, param_interval: 3, ..Default::default() };
        let mut cb = callback(dir.path(), config, None);
        let paths = cb.paths().clone();

        // Act / Assert
        cb.step(&array![1.0, 0.0], 9.0).expect("persist");
        assert!(!paths.losses.exists() && !paths.params.exists());

        cb.step(&array![2.0, 0.0], 8.0).expect("persist");
        assert_eq!(load_history(&paths.losses).expect("history").train, vec![8.0]);
        assert!(!paths.params.exists());

        cb.step(&array![3.0, 0.0], 9.5).expect("persist");
        assert_eq!(load_params(&paths.params).expect("params"), vec![2.0, 0.0]);

        cb.step(&array![4.0, 0.0], 1.0).expect("persist");
        cb.finish().expect("flush");
        assert_eq!(load_params(&paths.params).expect("params"), vec![4.0, 0.0]);
        assert_eq!(load_history(&paths.losses).expect("history").train, vec![8.0, 1.0]);
    }

    #[test]
    // Purpose
    // -------
    // With best-by-eval selection the evaluation loss decides, and it is
    // recorded alongside the train loss.
    fn eval_loss_selection() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let eval: EvalLoss = Arc::new(|theta: &Theta| (theta[0] - 2.0).abs());
        let config = CheckpointConfig { best_by: BestBy::EvalLoss, ..Default::default() };
        let mut cb = callback(dir.path(), config, Some(eval));

        // Act: train loss keeps falling, eval loss is best at theta = 2
        cb.step(&array![1.0, 0.0], 3.0).expect("persist");
        cb.step(&array![2.0, 0.0], 2.0).expect("persist");
        cb.step(&array![5.0, 0.0], 1.0).expect("persist");

        // Assert
        let state = cb.into_state();
        assert_eq!(state.best_params, array![2.0, 0.0]);
        assert_eq!(state.best_loss, 0.0);
        assert_eq!(state.history.eval, vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn construction_rejects_inconsistent_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let seeded = || CallbackState::seeded(array![0.0], 1.0);
        let paths = CheckpointPaths::for_stage(dir.path(), "", "s");

        let by_eval = CheckpointConfig { best_by: BestBy::EvalLoss, ..Default::default() };
        let err = CheckpointCallback::new(seeded(), by_eval, paths.clone(), None, 10);
        assert!(matches!(err, Err(TrainingError::InvalidCheckpoint { .. })));

        let zero = CheckpointConfig { param_interval: 0, ..Default::default() };
        let err = CheckpointCallback::new(seeded(), zero, paths, None, 10);
        assert!(matches!(err, Err(TrainingError::InvalidCheckpoint { .. })));
    }

    #[test]
    fn persistence_failure_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"not a directory").expect("write");
        let mut cb = callback(&blocker, CheckpointConfig::default(), None);
        assert!(matches!(cb.step(&array![1.0, 1.0], 1.0), Err(PersistError::Io { .. })));
    }

    #[test]
    #[should_panic(expected = "parameter length")]
    fn mismatched_parameter_length_panics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cb = callback(dir.path(), CheckpointConfig::default(), None);
        let _ = cb.step(&array![1.0, 2.0, 3.0], 1.0);
    }
}

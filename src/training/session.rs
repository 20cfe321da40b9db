//! Training-session sequencer: ordered optimizer stages with best-point
//! hand-off.
//!
//! Purpose
//! -------
//! Run a list of [`TrainingStage`]s in order over one loss. Each stage starts
//! from the best parameters of the previous one and gets its own
//! [`CheckpointCallback`] bound to its own blob paths.
//!
//! Key behaviors
//! -------------
//! - A stage is seeded with the loss of the carried-in parameters (the train
//!   loss via `probe`, or the eval loss under [`BestBy::EvalLoss`]), so a
//!   stage never ends worse than it started.
//! - Optimizer failures other than cancellation are logged and the stage is
//!   skipped with the parameters it received.
//! - Cancellation aborts the session at once with
//!   [`TrainingError::Cancelled`]; no further stage starts.
//! - Callback (persistence) failures are fatal and surface as
//!   [`TrainingError::Checkpoint`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Stages share nothing mutable; only the parameter vector crosses a stage
//!   boundary.
//! - Histories are concatenated in stage order.
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::{
    optimization::{Objective, OptError, StageOptimizer, Theta, minimize},
    training::{
        callback::{BestBy, CallbackState, CheckpointCallback, CheckpointConfig, CheckpointPaths, LossHistory},
        cancel::CancelToken,
        errors::{TrainingError, TrainingResult},
        loss::EvalLoss,
    },
};

/// One optimizer run in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStage {
    pub name: String,
    pub optimizer: StageOptimizer,
    pub max_iters: usize,
}

impl TrainingStage {
    pub fn new(name: impl Into<String>, optimizer: StageOptimizer, max_iters: usize) -> Self {
        Self { name: name.into(), optimizer, max_iters }
    }

    /// Copy of this stage with a different iteration budget.
    pub fn with_max_iters(&self, max_iters: usize) -> Self {
        Self { max_iters, ..self.clone() }
    }

    /// The name becomes part of a file name, so it must be non-empty and free
    /// of path separators.
    pub fn validate(&self) -> TrainingResult<()> {
        let invalid = |reason| TrainingError::InvalidStage { name: self.name.clone(), reason };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(invalid("name must not contain path separators"));
        }
        if self.max_iters == 0 {
            return Err(invalid("max_iters must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageStatus {
    Completed { optimizer_status: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub name: String,
    pub iterations: usize,
    /// Loss of the carried-in parameters.
    pub start_loss: f64,
    pub best_loss: f64,
    pub status: StageStatus,
    /// Test loss of the parameters handed to the next stage.
    pub test_loss: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub params: Theta,
    pub best_loss: f64,
    pub history: LossHistory,
    pub reports: Vec<StageReport>,
}

/// Runs stages and owns each stage's callback for the stage's lifetime.
#[derive(Debug, Clone)]
pub struct SessionSequencer {
    checkpoint_dir: PathBuf,
    prefix: String,
    config: CheckpointConfig,
    cancel: CancelToken,
}

impl SessionSequencer {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, config: CheckpointConfig, cancel: CancelToken) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), prefix: String::new(), config, cancel }
    }

    /// Prefix prepended to every stage's blob names.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `stages` in order from `theta0`.
    ///
    /// Parameters
    /// ----------
    /// - `loss`: the training loss the optimizers minimize.
    /// - `eval_loss`: optional loss recorded at every iteration; required
    ///   when the configuration selects the best point by eval loss.
    /// - `test_loss`: optional loss reported once per stage.
    ///
    /// Errors
    /// ------
    /// - [`TrainingError::Cancelled`] if the token is set before a stage or
    ///   during one.
    /// - [`TrainingError::Checkpoint`] if a callback fails to persist.
    /// - [`TrainingError::InvalidStage`] / [`TrainingError::InvalidCheckpoint`]
    ///   for unusable inputs, before any stage runs.
    pub fn run<O: Objective>(
        &self, loss: &O, eval_loss: Option<&EvalLoss>, test_loss: Option<&EvalLoss>, theta0: Theta,
        stages: &[TrainingStage],
    ) -> TrainingResult<SessionOutcome> {
        self.config.validate()?;
        for stage in stages {
            stage.validate()?;
        }
        if self.config.best_by == BestBy::EvalLoss && eval_loss.is_none() {
            return Err(TrainingError::InvalidCheckpoint {
                reason: "best-by-eval selection needs an evaluation loss",
            });
        }

        let mut params = theta0;
        let mut best_loss = self.seed_loss(loss, eval_loss, &params);
        let mut history = LossHistory::default();
        let mut reports = Vec::with_capacity(stages.len());

        for stage in stages {
            if self.cancel.is_cancelled() {
                return Err(TrainingError::Cancelled);
            }
            let _span = info_span!("stage", name = %stage.name, optimizer = stage.optimizer.name()).entered();

            let start_loss = self.seed_loss(loss, eval_loss, &params);
            let paths = CheckpointPaths::for_stage(&self.checkpoint_dir, &self.prefix, &stage.name);
            let callback = Arc::new(Mutex::new(CheckpointCallback::new(
                CallbackState::seeded(params.clone(), start_loss),
                self.config.clone(),
                paths,
                eval_loss.cloned(),
                stage.max_iters,
            )?));

            let result =
                minimize(loss, params.clone(), &stage.optimizer, stage.max_iters, Arc::clone(&callback), &self.cancel);

            let mut guard = callback.lock().unwrap_or_else(PoisonError::into_inner);
            let checkpoint_err =
                |text: String| TrainingError::Checkpoint { stage: stage.name.clone(), text };
            let status = match result {
                Ok(outcome) => {
                    guard.finish().map_err(|e| checkpoint_err(e.to_string()))?;
                    StageStatus::Completed { optimizer_status: outcome.status }
                }
                Err(OptError::Cancelled) => {
                    if let Err(err) = guard.finish() {
                        warn!(error = %err, "could not flush checkpoint after cancellation");
                    }
                    return Err(TrainingError::Cancelled);
                }
                Err(OptError::Callback { text }) => return Err(checkpoint_err(text)),
                Err(err) => {
                    warn!(error = %err, "stage failed; keeping its starting parameters");
                    guard.finish().map_err(|e| checkpoint_err(e.to_string()))?;
                    StageStatus::Failed { reason: err.to_string() }
                }
            };

            let state = guard.state().clone();
            drop(guard);
            let stage_best = match status {
                StageStatus::Completed { .. } => {
                    params = state.best_params;
                    state.best_loss
                }
                StageStatus::Failed { .. } => start_loss,
            };
            best_loss = stage_best;
            history.extend(state.history);

            let test_loss = test_loss.map(|f| f(&params));
            info!(iterations = state.iteration, start_loss, best_loss, ?test_loss, "stage finished");
            reports.push(StageReport {
                name: stage.name.clone(),
                iterations: state.iteration,
                start_loss,
                best_loss,
                status,
                test_loss,
            });
        }

        Ok(SessionOutcome { params, best_loss, history, reports })
    }

    fn seed_loss<O: Objective>(&self, loss: &O, eval_loss: Option<&EvalLoss>, params: &Theta) -> f64 {
        let seed = match (self.config.best_by, eval_loss) {
            (BestBy::EvalLoss, Some(eval)) => eval(params),
            _ => loss.probe(params),
        };
        if seed.is_nan() { f64::INFINITY } else { seed }
    }
}

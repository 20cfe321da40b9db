//! Experiment runner: one setup → train → evaluate pipeline per location.
//!
//! Purpose
//! -------
//! Fan the full vertical slice across locations, sequentially or on a fixed
//! `rayon` worker pool, and aggregate one [`ExperimentResult`] per completed
//! location.
//!
//! Key behaviors
//! -------------
//! - Each location owns its predictor, datasets and parameters; nothing
//!   mutable is shared between tasks except through [`SharedResources`].
//! - Two distinct critical sections:
//!   - the results lock, held only while one result is pushed;
//!   - the renderer lock, held for the whole evaluation/rendering step of a
//!     location (and for each curriculum frame), since renderers are not
//!     re-entrant.
//! - A cancelled location cancels the shared token, so sibling tasks stop
//!   at their next iteration boundary and pending ones never start;
//!   [`ExperimentRunner::run_all`] then returns
//!   [`ExperimentError::Cancelled`].
//! - Other location failures are logged and listed in
//!   [`ExperimentSummary::failures`].
//!
//! Output layout
//! -------------
//! `<output_dir>/<session uuid>/<location>/` holds the stage checkpoint
//! blobs, `params.bin` (final parameters) and `errors.csv` (forecast errors,
//! when test data is supplied).
//!
//! Ordering
//! --------
//! Sequential mode visits locations in the given order. Parallel completion
//! order is unspecified; only the set of results is deterministic.
use std::{
    collections::HashSet,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use rayon::{ThreadPoolBuilder, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::{
    data::TimeseriesDataset,
    experiment::{
        errors::{ExperimentError, RunResult},
        evaluator::{ForecastMetric, evaluate},
        render::{FitFrame, NoopRenderer, SharedRenderer, shared},
    },
    optimization::Theta,
    training::{
        BatchLoss, BestBy, CancelToken, CheckpointConfig, CurriculumConfig, CurriculumScheduler, FitTarget,
        LossEvaluator, LossMetric, Predictor, SessionSequencer, TrainingStage, save_params,
    },
};

/// Final state of one completed location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentResult {
    pub location: String,
    pub final_params: Vec<f64>,
    pub final_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationFailure {
    pub location: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentSummary {
    pub session_id: Uuid,
    pub session_dir: PathBuf,
    pub results: Vec<ExperimentResult>,
    pub failures: Vec<LocationFailure>,
}

impl ExperimentSummary {
    pub fn locations(&self) -> HashSet<&str> {
        self.results.iter().map(|r| r.location.as_str()).collect()
    }
}

/// `Parallel { workers: 0 }` uses rayon's default pool size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel {
        workers: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingPlan {
    /// One session over the whole training set.
    Session { stages: Vec<TrainingStage>, batch_size: usize },
    /// Growing windows, then `final_stages` on the full horizon.
    Curriculum { config: CurriculumConfig, stages: Vec<TrainingStage>, final_stages: Vec<TrainingStage> },
}

impl TrainingPlan {
    fn stages(&self) -> Vec<&TrainingStage> {
        match self {
            TrainingPlan::Session { stages, .. } => stages.iter().collect(),
            TrainingPlan::Curriculum { stages, final_stages, .. } => {
                stages.iter().chain(final_stages).collect()
            }
        }
    }
}

/// Forecast metrics and horizons of the per-location evaluation.
///
/// An empty `horizons` list scores the whole test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub metrics: Vec<ForecastMetric>,
    pub horizons: Vec<usize>,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self { metrics: ForecastMetric::ALL.to_vec(), horizons: Vec::new() }
    }
}

/// Lock handles shared by every location task.
#[derive(Clone)]
pub struct SharedResources {
    results: Arc<Mutex<Vec<ExperimentResult>>>,
    renderer: SharedRenderer,
}

impl Default for SharedResources {
    fn default() -> Self {
        Self::new(shared(NoopRenderer))
    }
}

impl SharedResources {
    pub fn new(renderer: SharedRenderer) -> Self {
        Self { results: Arc::default(), renderer }
    }

    pub fn renderer(&self) -> &SharedRenderer {
        &self.renderer
    }

    pub fn push_result(&self, result: ExperimentResult) {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).push(result);
    }

    /// Snapshot of the results collected so far.
    pub fn results(&self) -> Vec<ExperimentResult> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn take_results(&self) -> Vec<ExperimentResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Everything the model-setup collaborator provides for one location.
pub struct LocationSetup<P: ?Sized> {
    pub predictor: Arc<P>,
    pub initial_params: Theta,
    pub train: Arc<TimeseriesDataset>,
    pub test: Option<Arc<TimeseriesDataset>>,
    /// One label per observed variable, used as error-table columns.
    pub labels: Vec<String>,
    pub metric: LossMetric,
}

impl<P: Predictor + ?Sized> LocationSetup<P> {
    /// Setup without test data; labels default to `var0, var1, …`.
    pub fn new(predictor: Arc<P>, initial_params: Theta, train: Arc<TimeseriesDataset>, metric: LossMetric) -> Self {
        let labels = (0..train.n_vars()).map(|i| format!("var{i}")).collect();
        Self { predictor, initial_params, train, test: None, labels, metric }
    }

    pub fn with_test(mut self, test: Arc<TimeseriesDataset>) -> Self {
        self.test = Some(test);
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}

pub struct ExperimentRunner {
    output_dir: PathBuf,
    session_id: Uuid,
    mode: ExecutionMode,
    checkpoint: CheckpointConfig,
    evaluation: EvaluationSettings,
    resources: SharedResources,
    cancel: CancelToken,
}

impl ExperimentRunner {
    /// New runner with a fresh session id.
    pub fn new(output_dir: impl Into<PathBuf>, mode: ExecutionMode, resources: SharedResources, cancel: CancelToken) -> Self {
        Self {
            output_dir: output_dir.into(),
            session_id: Uuid::new_v4(),
            mode,
            checkpoint: CheckpointConfig::default(),
            evaluation: EvaluationSettings::default(),
            resources,
            cancel,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointConfig) -> Self {
        self.checkpoint = checkpoint;
        self
    }

    pub fn with_evaluation(mut self, evaluation: EvaluationSettings) -> Self {
        self.evaluation = evaluation;
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn session_dir(&self) -> PathBuf {
        self.output_dir.join(self.session_id.to_string())
    }

    pub fn location_dir(&self, location: &str) -> PathBuf {
        self.session_dir().join(location)
    }

    pub fn resources(&self) -> &SharedResources {
        &self.resources
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run `plan` for every location.
    ///
    /// Parameters
    /// ----------
    /// - `setup_fn`: builds the predictor, datasets and initial parameters
    ///   of one location from its id and `hyper`.
    ///
    /// Errors
    /// ------
    /// - [`ExperimentError::Cancelled`] if the shared token was set by a
    ///   task or from outside.
    /// - [`ExperimentError::Setup`] for duplicate location ids, and
    ///   configuration errors, before any location runs.
    /// - [`ExperimentError::ThreadPool`] if the worker pool cannot be built.
    pub fn run_all<P, H, F>(
        &self, locations: &[String], setup_fn: F, plan: &TrainingPlan, hyper: &H,
    ) -> RunResult<ExperimentSummary>
    where
        P: Predictor + ?Sized + 'static,
        H: Sync + ?Sized,
        F: Fn(&str, &H) -> RunResult<LocationSetup<P>> + Sync,
    {
        self.checkpoint.validate()?;
        for stage in plan.stages() {
            stage.validate()?;
        }
        let mut seen = HashSet::new();
        if let Some(dup) = locations.iter().find(|loc| !seen.insert(loc.as_str())) {
            return Err(ExperimentError::Setup { location: dup.clone(), reason: "duplicate location id".to_string() });
        }

        let failures = Mutex::new(Vec::new());
        let task = |location: &String| match self.run_location(location, &setup_fn, plan, hyper) {
            Ok(()) => {}
            Err(err) if err.is_cancellation() => {
                warn!(location = %location, "location cancelled; stopping all tasks");
                self.cancel.cancel();
            }
            Err(err) => {
                warn!(location = %location, error = %err, "location failed");
                failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(LocationFailure { location: location.clone(), reason: err.to_string() });
            }
        };

        info!(session = %self.session_id, locations = locations.len(), mode = ?self.mode, "experiment started");
        match self.mode {
            ExecutionMode::Sequential => {
                for location in locations {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    task(location);
                }
            }
            ExecutionMode::Parallel { workers } => {
                let pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
                pool.install(|| locations.par_iter().for_each(&task));
            }
        }

        if self.cancel.is_cancelled() {
            return Err(ExperimentError::Cancelled);
        }
        let failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        let results = self.resources.take_results();
        info!(completed = results.len(), failed = failures.len(), "experiment finished");
        Ok(ExperimentSummary { session_id: self.session_id, session_dir: self.session_dir(), results, failures })
    }

    fn run_location<P, H, F>(&self, location: &str, setup_fn: &F, plan: &TrainingPlan, hyper: &H) -> RunResult<()>
    where
        P: Predictor + ?Sized + 'static,
        H: ?Sized,
        F: Fn(&str, &H) -> RunResult<LocationSetup<P>>,
    {
        if self.cancel.is_cancelled() {
            return Err(ExperimentError::Cancelled);
        }
        let _span = info_span!("location", location).entered();
        let setup = setup_fn(location, hyper)?;
        let dir = self.location_dir(location);
        fs::create_dir_all(&dir).map_err(|source| ExperimentError::Io { path: dir.clone(), source })?;

        let target = FitTarget::new(Arc::clone(&setup.predictor), Arc::clone(&setup.train), setup.metric.clone());
        let test_loss = match &setup.test {
            Some(test) => {
                let core = BatchLoss::new(Arc::clone(&setup.predictor), Arc::clone(test), test.len(), setup.metric.clone())?
                    .with_origin(setup.train.tspan().0);
                Some(Arc::new(core).full_window_fn())
            }
            None => None,
        };
        let sequencer = SessionSequencer::new(&dir, self.checkpoint.clone(), self.cancel.clone());

        let (params, final_loss) = match plan {
            TrainingPlan::Session { stages, batch_size } => {
                let core = Arc::new(target.batch_loss(setup.train.len())?);
                let evaluator = LossEvaluator::new(Arc::clone(&core), *batch_size);
                let by_eval = self.checkpoint.best_by == BestBy::EvalLoss;
                let eval_loss = (by_eval || evaluator.n_batches() > 1).then(|| core.full_window_fn());
                let outcome =
                    sequencer.run(&evaluator, eval_loss.as_ref(), test_loss.as_ref(), setup.initial_params.clone(), stages)?;
                (outcome.params, outcome.best_loss)
            }
            TrainingPlan::Curriculum { config, stages, final_stages } => {
                let outcome = CurriculumScheduler::new(sequencer, config.clone())
                    .with_renderer(Arc::clone(self.resources.renderer()), location)
                    .run(&target, test_loss.as_ref(), setup.initial_params.clone(), stages, final_stages)?;
                (outcome.params, outcome.best_loss)
            }
        };

        save_params(&dir.join("params.bin"), &params.to_vec())?;
        self.evaluate_and_render(location, &setup, &params, &dir)?;
        self.resources.push_result(ExperimentResult {
            location: location.to_string(),
            final_params: params.to_vec(),
            final_loss,
        });
        info!(final_loss, "location finished");
        Ok(())
    }

    /// Forecast evaluation and the final frame, under the renderer lock.
    fn evaluate_and_render<P: Predictor + ?Sized>(
        &self, location: &str, setup: &LocationSetup<P>, params: &Theta, dir: &std::path::Path,
    ) -> RunResult<()> {
        let mut renderer = self.resources.renderer().lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(test) = &setup.test {
            let horizons =
                if self.evaluation.horizons.is_empty() { vec![test.len()] } else { self.evaluation.horizons.clone() };
            let table = evaluate(
                setup.predictor.as_ref(),
                params,
                &setup.train,
                test,
                &self.evaluation.metrics,
                &horizons,
                &setup.labels,
            )?;
            table.write_csv(&dir.join("errors.csv"))?;
        }
        let frame = FitFrame::capture(location, setup.train.len(), setup.predictor.as_ref(), &setup.train, params);
        if let Err(err) = renderer.render(&frame) {
            warn!(error = %err, "could not render final frame");
        }
        Ok(())
    }
}

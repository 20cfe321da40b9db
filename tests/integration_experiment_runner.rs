//! Integration tests for the experiment runner.
//!
//! Purpose
//! -------
//! - Validate the per-location pipeline (setup → train → evaluate → render)
//!   across execution modes, starting from a TOML configuration.
//!
//! Coverage
//! --------
//! - `experiment::runner`: result set equality between one worker and many,
//!   cancellation from inside a parallel task, frames under the shared
//!   renderer lock, no overlapping `render` calls across workers.
//! - `experiment::config`: a parsed config drives a curriculum run.
//!
//! Exclusions
//! ----------
//! - Forecast metric arithmetic and CSV layout; covered by unit tests.
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use ndarray::{Array2, ArrayView1, array};
use rust_epifit::{
    data::TimeseriesDataset,
    experiment::{
        ExecutionMode, ExperimentConfig, ExperimentError, ExperimentResult, ExperimentRunner, FitFrame,
        FrameRecorder, LocationSetup, RenderError, Renderer, RunResult, SharedResources, TrainingPlan, shared,
    },
    optimization::{LbfgsConfig, NelderMeadConfig, StageOptimizer},
    training::{CancelToken, CurriculumConfig, FnPredictor, LossMetric, Predictor, TrainingStage},
};

const LOCATIONS: [&str; 6] = ["l0", "l1", "l2", "l3", "l4", "l5"];

fn locations() -> Vec<String> {
    LOCATIONS.iter().map(|s| s.to_string()).collect()
}

/// Purpose
/// -------
/// Per-location setup for a level-fitting problem: location `lK` observes
/// the constant `K + 1` over 10 days and the model predicts `θ₀` everywhere.
/// The first 8 days train, the last 2 test.
fn level_setup(location: &str, _hyper: &()) -> RunResult<LocationSetup<dyn Predictor>> {
    let level = location[1..].parse::<f64>().map_err(|e| ExperimentError::Setup {
        location: location.to_string(),
        reason: e.to_string(),
    })? + 1.0;
    let predictor: Arc<dyn Predictor> =
        Arc::new(FnPredictor::new(1, |theta: ArrayView1<'_, f64>, _tspan, tsteps: ArrayView1<'_, f64>| {
            Ok(Array2::from_elem((1, tsteps.len()), theta[0]))
        }));
    let data = TimeseriesDataset::from_daily(Array2::from_elem((1, 10), level), 0.0)?;
    let (train, test) = data.split(8)?;
    Ok(LocationSetup::new(predictor, array![0.0], Arc::new(train), LossMetric::mse()).with_test(Arc::new(test)))
}

/// L-BFGS converges on the quadratic level loss; a one-dimensional simplex
/// can stop on two equal-cost vertices either side of the level.
fn session_plan() -> TrainingPlan {
    TrainingPlan::Session {
        stages: vec![TrainingStage::new("lbfgs", StageOptimizer::Lbfgs(LbfgsConfig::default()), 60)],
        batch_size: 0,
    }
}

fn by_location(results: Vec<ExperimentResult>) -> BTreeMap<String, ExperimentResult> {
    results.into_iter().map(|r| (r.location.clone(), r)).collect()
}

#[test]
// Purpose
// -------
// The set of results does not depend on the number of workers.
//
// Given
// -----
// - Six independent locations and a deterministic L-BFGS session.
// - One run with `workers = 1`, one with `workers = 6`.
//
// Expect
// ------
// - Both runs complete every location without failures.
// - Keyed by location, final parameters and losses are identical.
// - Each fitted level is close to the observed one.
fn results_match_for_one_and_many_workers() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let run = |workers| {
        let runner = ExperimentRunner::new(
            dir.path(),
            ExecutionMode::Parallel { workers },
            SharedResources::default(),
            CancelToken::new(),
        );
        runner.run_all(&locations(), level_setup, &session_plan(), &()).expect("run completes")
    };

    // Act
    let single = run(1);
    let many = run(LOCATIONS.len());

    // Assert
    assert!(single.failures.is_empty() && many.failures.is_empty());
    assert_ne!(single.session_id, many.session_id);
    assert_eq!(single.locations(), many.locations());
    assert_eq!(single.locations().len(), LOCATIONS.len());
    let single = by_location(single.results);
    assert_eq!(single, by_location(many.results));
    for (location, result) in &single {
        let level = location[1..].parse::<f64>().expect("numeric suffix") + 1.0;
        assert!((result.final_params[0] - level).abs() < 1e-2, "{location}: {:?}", result.final_params);
    }
}

#[test]
// Purpose
// -------
// A cancellation raised inside one parallel task stops the whole run.
//
// Given
// -----
// - Six locations on two workers; location `l2`'s predictor sets the
//   shared token on its first call.
//
// Expect
// ------
// - `run_all` returns `ExperimentError::Cancelled`.
// - `l2` never reports a result.
fn cancellation_inside_a_task_stops_the_run() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let cancel = CancelToken::new();
    let resources = SharedResources::default();
    let runner = ExperimentRunner::new(
        dir.path(),
        ExecutionMode::Parallel { workers: 2 },
        resources.clone(),
        cancel.clone(),
    );
    let trip = cancel.clone();
    let setup = move |location: &str, hyper: &()| -> RunResult<LocationSetup<dyn Predictor>> {
        let mut setup = level_setup(location, hyper)?;
        if location == "l2" {
            let trip = trip.clone();
            setup.predictor =
                Arc::new(FnPredictor::new(1, move |theta: ArrayView1<'_, f64>, _tspan, tsteps: ArrayView1<'_, f64>| {
                    trip.cancel();
                    Ok(Array2::from_elem((1, tsteps.len()), theta[0]))
                }));
        }
        Ok(setup)
    };

    // Act
    let err = runner.run_all(&locations(), setup, &session_plan(), &()).unwrap_err();

    // Assert
    assert!(matches!(err, ExperimentError::Cancelled));
    assert!(cancel.is_cancelled());
    assert!(resources.results().iter().all(|r| r.location != "l2"));
}

#[test]
// Purpose
// -------
// A TOML config drives a curriculum run whose frames reach the shared
// renderer.
//
// Given
// -----
// - A config with three locations, parallel execution, a two-window
//   curriculum and one final stage.
// - A `FrameRecorder` as the shared renderer.
//
// Expect
// ------
// - Every location completes and writes `params.bin` and `errors.csv`.
// - Every line of the frame file decodes to a `FitFrame`, and every
//   location has at least one frame per window plus its final frame.
fn config_driven_curriculum_run_renders_frames() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let text = format!(
        r#"
        output_dir = "{}"
        locations = ["l0", "l1", "l2"]
        execution = {{ kind = "parallel", workers = 3 }}

        [evaluation]
        metrics = ["mae", "rmse"]
        horizons = [1, 2]

        [[stages]]
        name = "simplex"
        max_iters = 1
        optimizer = {{ kind = "nelder_mead" }}

        [curriculum]
        initial_window = 4
        window_step = 4
        base_iters = 20
        iters_per_step = 0

        [[final_stages]]
        name = "polish"
        max_iters = 30
        optimizer = {{ kind = "nelder_mead", simplex_step = 0.05 }}
        "#,
        dir.path().join("runs").display()
    );
    let config = ExperimentConfig::from_toml_str(&text).expect("valid config");
    let frames_path = dir.path().join("frames.jsonl");
    let resources = SharedResources::new(shared(FrameRecorder::new(&frames_path)));
    let runner = config.runner(resources, CancelToken::new());

    // Act
    let summary =
        runner.run_all(&config.locations, level_setup, &config.plan(), &()).expect("run completes");

    // Assert
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(summary.results.len(), 3);
    for location in &config.locations {
        let loc_dir = runner.location_dir(location);
        assert!(loc_dir.join("params.bin").exists());
        let csv = std::fs::read_to_string(loc_dir.join("errors.csv")).expect("errors.csv");
        assert_eq!(csv.lines().count(), 1 + 2 * 2);
    }

    let text = std::fs::read_to_string(&frames_path).expect("frames");
    let frames: Vec<FitFrame> =
        text.lines().map(|line| serde_json::from_str(line).expect("frame decodes")).collect();
    for location in &config.locations {
        let count = frames.iter().filter(|f| &f.label == location).count();
        assert!(count >= 3, "{location} rendered {count} frames");
    }
}

/// Renderer that counts frames and records any call made while another is
/// still in progress.
struct ExclusiveRenderer {
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    frames: Arc<AtomicUsize>,
}

impl Renderer for ExclusiveRenderer {
    fn render(&mut self, _frame: &FitFrame) -> Result<(), RenderError> {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(2));
        self.frames.fetch_add(1, Ordering::SeqCst);
        self.busy.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
// Purpose
// -------
// Workers never call the shared renderer concurrently, neither for
// curriculum frames nor for final frames.
//
// Given
// -----
// - Six locations on four workers with a two-window curriculum.
// - A renderer that flags re-entry and sleeps inside `render`.
//
// Expect
// ------
// - No overlapping calls were observed.
// - Every location rendered one frame per window plus its final frame.
fn parallel_workers_never_overlap_in_the_renderer() {
    // Arrange
    let dir = tempfile::tempdir().expect("tempdir");
    let overlaps = Arc::new(AtomicUsize::new(0));
    let frames = Arc::new(AtomicUsize::new(0));
    let renderer = ExclusiveRenderer {
        busy: Arc::new(AtomicBool::new(false)),
        overlaps: Arc::clone(&overlaps),
        frames: Arc::clone(&frames),
    };
    let runner = ExperimentRunner::new(
        dir.path(),
        ExecutionMode::Parallel { workers: 4 },
        SharedResources::new(shared(renderer)),
        CancelToken::new(),
    );
    let plan = TrainingPlan::Curriculum {
        config: CurriculumConfig {
            initial_window: 4,
            window_step: 4,
            base_iters: 10,
            iters_per_step: 0,
            ..CurriculumConfig::default()
        },
        stages: vec![TrainingStage::new("simplex", StageOptimizer::NelderMead(NelderMeadConfig::default()), 1)],
        final_stages: Vec::new(),
    };

    // Act
    let summary = runner.run_all(&locations(), level_setup, &plan, &()).expect("run completes");

    // Assert
    assert!(summary.failures.is_empty(), "{:?}", summary.failures);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(frames.load(Ordering::SeqCst) >= 3 * LOCATIONS.len());
}

//! experiment — per-location orchestration, forecast evaluation, rendering
//! and TOML configuration.
//!
//! Purpose
//! -------
//! Drive the training pipeline across many locations and report how well
//! each fitted model forecasts held-out data.
//!
//! Key behaviors
//! -------------
//! - [`ExperimentRunner`] runs setup → train → evaluate per location,
//!   sequentially or on a `rayon` pool, with explicit shared lock handles.
//! - [`evaluate`] scores forecasts with [`ForecastMetric`]s into an
//!   [`ErrorTable`] written as CSV.
//! - [`Renderer`]s receive [`FitFrame`]s; rendering never fails a run.
//! - [`ExperimentConfig`] deserialises a whole experiment from TOML.
//!
//! Conventions
//! -----------
//! - Fallible entry points return [`RunResult<T>`]; evaluation uses
//!   [`EvalResult<T>`].

pub mod config;
pub mod errors;
pub mod evaluator;
pub mod render;
pub mod runner;

pub use self::config::ExperimentConfig;
pub use self::errors::{ConfigError, EvalError, EvalResult, ExperimentError, RenderError, RunResult};
pub use self::evaluator::{ErrorRow, ErrorTable, ForecastMetric, evaluate};
pub use self::render::{FitFrame, FrameRecorder, NoopRenderer, Renderer, SharedRenderer, shared};
pub use self::runner::{
    EvaluationSettings, ExecutionMode, ExperimentResult, ExperimentRunner, ExperimentSummary,
    LocationFailure, LocationSetup, SharedResources, TrainingPlan,
};

//! training — loss evaluation, checkpointing, stage sequencing and the
//! growing-window curriculum.
//!
//! Purpose
//! -------
//! Fit a parameter vector to a time series by minimizing a trajectory loss
//! with one or more optimizer stages, while persisting progress and
//! honouring cooperative cancellation.
//!
//! Key behaviors
//! -------------
//! - [`Predictor`] wraps one IVP solve; [`LossEvaluator`] scores it batch by
//!   batch against ground truth with a [`LossMetric`].
//! - [`CheckpointCallback`] tracks the best point of a stage and persists
//!   history and parameters as `bincode` blobs.
//! - [`SessionSequencer`] runs stages in order with best-point hand-off;
//!   [`CurriculumScheduler`] repeats the session over growing windows.
//!
//! Invariants & assumptions
//! ------------------------
//! - Divergence is a loss of `+∞`, never an error.
//! - A failing stage is skipped; cancellation and persistence failures
//!   abort the run.
//!
//! Conventions
//! -----------
//! - Fallible entry points return [`TrainingResult<T>`]; events are emitted
//!   through `tracing` and no subscriber is installed here.

pub mod callback;
pub mod cancel;
pub mod curriculum;
pub mod errors;
pub mod loss;
pub mod metrics;
pub mod persistence;
pub mod predictor;
pub mod session;

pub use self::callback::{
    BestBy, CallbackState, CheckpointCallback, CheckpointConfig, CheckpointPaths, LossHistory,
};
pub use self::cancel::{CancelToken, install_interrupt_handler};
pub use self::curriculum::{
    CurriculumConfig, CurriculumOutcome, CurriculumScheduler, WindowReport,
};
pub use self::errors::{PersistError, TrainingError, TrainingResult};
pub use self::loss::{BatchLoss, EvalLoss, FitTarget, LossEvaluator};
pub use self::metrics::LossMetric;
pub use self::persistence::{load_history, load_params, save_history, save_params};
pub use self::predictor::{FnPredictor, OdePredictor, Predictor, Trajectory};
pub use self::session::{
    SessionOutcome, SessionSequencer, StageReport, StageStatus, TrainingStage,
};

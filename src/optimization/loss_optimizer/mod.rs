//! loss_optimizer — argmin-powered optimizer stages for training losses.
//!
//! Purpose
//! -------
//! Provide the optimizer collaborator of the training engine: given a loss
//! (an [`Objective`]), a starting point, a stage configuration
//! ([`StageOptimizer`]), an iteration budget and a per-iteration
//! [`IterationCallback`], run one Argmin solver and return an
//! [`OptimOutcome`].
//!
//! Key behaviors
//! -------------
//! - Convert objectives into Argmin problems via [`adapter::ArgMinAdapter`],
//!   with analytic gradients when available and finite differences
//!   (central, then forward) otherwise.
//! - Build Adam ([`adam::Adam`], a custom Argmin solver), L-BFGS
//!   (More–Thuente or Hager–Zhang line search) or Nelder–Mead through
//!   [`builders`].
//! - Drive the callback through [`observer::ObserverBridge`], which also
//!   checks the shared cancellation token at every iteration boundary.
//!
//! Invariants & assumptions
//! ------------------------
//! - Losses are minimized directly; `+∞` is a legal loss meaning
//!   "diverged". A gradient that cannot be made finite fails the stage.
//! - The callback is invoked exactly once per completed iteration, in
//!   iteration order, and its stop signal is honoured.
//! - Cancellation is reported as [`OptError::Cancelled`] and nothing else;
//!   callers rely on this to tell user interrupts from solver failures.
//!
//! Conventions
//! -----------
//! - Parameters are [`Theta`] (`Array1<f64>`). Any mapping from constrained
//!   to unconstrained space happens in the model layer.
//! - Errors bubble up as [`OptResult<T>`] / [`OptError`]; this module and its
//!   children never intentionally panic or use `unsafe`.
//!
//! Downstream usage
//! ----------------
//! - The training-session sequencer calls [`minimize`] once per stage with
//!   its loss evaluator and checkpointing callback.
//!
//! Testing notes
//! -------------
//! - Unit tests in submodules cover gradient handling in [`adapter`], solver
//!   construction in [`builders`], the Adam update in [`adam`], validation
//!   rules, and the callback contract end-to-end in [`api`].
//!
//! [`OptError`]: crate::optimization::OptError
//! [`OptError::Cancelled`]: crate::optimization::OptError::Cancelled
//! [`OptResult<T>`]: crate::optimization::OptResult

pub mod adam;
pub mod adapter;
pub mod api;
pub mod builders;
pub mod observer;
pub mod run;
pub mod traits;
pub mod types;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::api::minimize;
pub use self::traits::{
    AdamConfig, IterationCallback, LbfgsConfig, LineSearcher, NelderMeadConfig, Objective,
    OptimOutcome, StageOptimizer,
};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

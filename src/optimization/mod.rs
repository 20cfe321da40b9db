//! optimization — optimizer stages and their unified error surface.
//!
//! Purpose
//! -------
//! Provide the optimizer collaborator used by training: an Argmin-backed
//! layer that minimizes a loss from a starting parameter vector with the
//! algorithm chosen for a stage, calls back once per iteration, and reports
//! a validated outcome. Callers implement a loss, pick a stage
//! configuration, and never touch backend solver details.
//!
//! Key behaviors
//! -------------
//! - Expose [`minimize`] and the configuration types of
//!   [`loss_optimizer`] (Adam, L-BFGS, Nelder–Mead).
//! - Normalize configuration issues, numerical failures, callback failures,
//!   cancellation and backend solver errors into a single enum
//!   (`errors::OptError`) with a common result alias (`OptResult<T>`).
//!
//! Invariants & assumptions
//! ------------------------
//! - Optimizers operate in an unconstrained parameter space `θ` and assume
//!   that inputs are finite once validation has passed; invalid states are
//!   reported as `OptError`, not panics.
//! - Divergent trajectories are expressed by the loss as `+∞`, never as an
//!   error from the objective.
//!
//! Conventions
//! -----------
//! - Public optimization entrypoints that can fail return `OptResult<T>`;
//!   callers never see raw Argmin errors.
//! - This module does no I/O and no logging; the training layer reports
//!   progress and recovered failures.
//!
//! Testing notes
//! -------------
//! - Unit tests in the submodules focus on local concerns: solver wiring,
//!   tolerance handling, the callback/cancellation contract, and error
//!   conversions from the backend into `OptError`.

pub mod errors;
pub mod loss_optimizer;

pub use self::errors::{OptError, OptResult};
pub use self::loss_optimizer::{
    AdamConfig, IterationCallback, LbfgsConfig, LineSearcher, NelderMeadConfig, Objective,
    OptimOutcome, StageOptimizer, Theta, minimize,
};

// ---- Optional convenience prelude for downstream crates -------------------
//
// Downstream crates can write
//
//     use rust_epifit::optimization::prelude::*;
//
// to import the main optimization surface in a single line.

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::loss_optimizer::{
        Cost, Grad, IterationCallback, Objective, StageOptimizer, Theta, minimize,
    };
}

//! ivp — initial-value problem contract and the default integrator.
//!
//! Purpose
//! -------
//! Define what the training engine needs from an IVP solver: integrate an
//! [`OdeSystem`] from a fixed initial state under a trial parameter vector and
//! report the state at requested output times, or signal failure as a value.
//!
//! Key behaviors
//! -------------
//! - [`OdeSystem`] is implemented by model crates (compartmental equations,
//!   learned rate functions); this crate never defines model equations.
//! - [`solve`] integrates with the [`IvpMethod`] fixed in [`SolverOptions`]:
//!   adaptive Dormand–Prince 5(4) by default, or fixed-step RK4.
//! - Divergence (step-size underflow, exhausted step budget, non-finite
//!   state) is returned as [`SolveFailure`]; nothing in this module panics on
//!   bad parameters.
//!
//! Conventions
//! -----------
//! - Trajectories are `[state × output time]` matrices, matching the layout of
//!   [`TimeseriesDataset`](crate::data::TimeseriesDataset).
//! - Output times must be sorted and lie inside the integration span.
pub mod errors;
pub mod solver;
pub mod system;

pub use self::errors::SolveFailure;
pub use self::solver::{IvpMethod, SolverOptions, solve};
pub use self::system::OdeSystem;

//! loss_optimizer::types — shared numeric aliases and solver wiring.
//!
//! Purpose
//! -------
//! Centralize the core numeric types and solver aliases used by the stage
//! optimizers. By defining these in one place, the rest of the optimization
//! and training code can stay agnostic to `ndarray` and Argmin generics.
//!
//! Invariants & assumptions
//! ------------------------
//! - All optimizer vectors are `ndarray` containers over `f64`.
//! - `Cost` is the training loss itself; it is minimized directly and may be
//!   `+∞` for parameters whose trajectory diverged.
//! - The line-search aliases assume Argmin's three-parameter forms
//!   `(Param, Gradient, Float)`.
//!
//! Testing notes
//! -------------
//! - This module only defines type aliases and constants; correctness is
//!   exercised by the solver tests in the sibling modules.
use argmin::{
    core::IterState,
    solver::{
        linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch},
        neldermead::NelderMead,
        quasinewton::LBFGS,
    },
};
use ndarray::Array1;
use std::collections::HashMap;

/// Parameter vector `θ`.
pub type Theta = Array1<f64>;

/// Gradient vector `∇L(θ)`, matching the shape of `Theta`.
pub type Grad = Array1<f64>;

/// Scalar loss value minimized by every stage.
pub type Cost = f64;

/// Function-evaluation counters as reported by the solver.
/// Maps human-readable counter names (e.g., `"cost_count"`) to counts.
pub type FnEvalMap = HashMap<String, u64>;

/// Default history size (`m`) for L-BFGS runs.
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Iteration state of gradient-based solvers (L-BFGS, Adam).
pub type GradState = IterState<Theta, Grad, (), (), (), Cost>;

/// Iteration state of derivative-free solvers (Nelder–Mead).
pub type SimplexState = IterState<Theta, (), (), (), (), Cost>;

/// Hager–Zhang line search specialized to this crate's numeric types.
pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;

/// More–Thuente line search specialized to this crate's numeric types.
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;

/// L-BFGS solver wired to the Hager–Zhang line search.
pub type LbfgsHagerZhang = LBFGS<HagerZhangLS, Theta, Grad, Cost>;

/// L-BFGS solver wired to the More–Thuente line search.
pub type LbfgsMoreThuente = LBFGS<MoreThuenteLS, Theta, Grad, Cost>;

/// Nelder–Mead simplex solver over `Theta`.
pub type Simplex = NelderMead<Theta, Cost>;

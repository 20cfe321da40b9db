//! Right-hand side contract for ODE models.
use ndarray::{ArrayView1, ArrayViewMut1};

/// A system of first-order ODEs `du/dt = f(t, u, θ)`.
///
/// Implementors write the derivative into `du` (same length as `u`) and must
/// not allocate per call if they want fast solves. Non-finite derivatives are
/// allowed; the integrator reports them as
/// [`SolveFailure::NonFiniteState`](crate::ivp::SolveFailure::NonFiniteState).
pub trait OdeSystem: Send + Sync {
    /// Number of state variables.
    fn dim(&self) -> usize;

    /// Evaluate `f(t, u, θ)` into `du`.
    fn rhs(&self, t: f64, u: ArrayView1<'_, f64>, theta: ArrayView1<'_, f64>, du: ArrayViewMut1<'_, f64>);
}

//! Trajectory prediction: one IVP solve per call, restricted to the observed
//! state variables.
//!
//! Purpose
//! -------
//! Turn a parameter vector into the model's trajectory over a batch's output
//! times. The loss evaluator and the forecast evaluator only see this
//! contract, never the solver.
//!
//! Key behaviors
//! -------------
//! - [`OdePredictor`] fixes the ODE system, the initial state, the observed
//!   state indices and the [`SolverOptions`] (method and tolerances) at
//!   construction; nothing is re-selected per call.
//! - Solver failures come back as `Err(SolveFailure)`; predictors never
//!   panic on bad parameters.
//! - [`FnPredictor`] wraps a closure with the same contract, for surrogate
//!   models and tests.
//!
//! Invariants & assumptions
//! ------------------------
//! - Predictors are stateless between calls and `Send + Sync`, so one
//!   instance can back concurrent evaluations.
//! - The returned trajectory has shape `(observed_len(), tsteps.len())`.
use ndarray::{Array1, Array2, ArrayView1, Axis};

use crate::ivp::{OdeSystem, SolveFailure, SolverOptions, solve};

/// `[observed variable × output time]` prediction.
pub type Trajectory = Array2<f64>;

pub trait Predictor: Send + Sync {
    /// Predict the observed variables at `tsteps`, integrating over `tspan`.
    fn predict(
        &self, theta: ArrayView1<'_, f64>, tspan: (f64, f64), tsteps: ArrayView1<'_, f64>,
    ) -> Result<Trajectory, SolveFailure>;

    /// Number of rows of every trajectory this predictor returns.
    fn observed_len(&self) -> usize;
}

/// Predictor backed by [`ivp::solve`](crate::ivp::solve).
#[derive(Debug, Clone)]
pub struct OdePredictor<S> {
    system: S,
    u0: Array1<f64>,
    observed: Vec<usize>,
    options: SolverOptions,
}

impl<S: OdeSystem> OdePredictor<S> {
    /// Construct with a fixed initial state and observed state indices.
    ///
    /// Errors
    /// ------
    /// - [`SolveFailure::DimensionMismatch`] if `u0` does not match the
    ///   system dimension or an observed index is out of range (reported as
    ///   `actual = index`).
    pub fn new(
        system: S, u0: Array1<f64>, observed: Vec<usize>, options: SolverOptions,
    ) -> Result<Self, SolveFailure> {
        let dim = system.dim();
        if u0.len() != dim {
            return Err(SolveFailure::DimensionMismatch { expected: dim, actual: u0.len() });
        }
        if let Some(&index) = observed.iter().find(|&&i| i >= dim) {
            return Err(SolveFailure::DimensionMismatch { expected: dim, actual: index });
        }
        Ok(Self { system, u0, observed, options })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    pub fn system(&self) -> &S {
        &self.system
    }
}

impl<S: OdeSystem> Predictor for OdePredictor<S> {
    fn predict(
        &self, theta: ArrayView1<'_, f64>, tspan: (f64, f64), tsteps: ArrayView1<'_, f64>,
    ) -> Result<Trajectory, SolveFailure> {
        let full = solve(&self.system, self.u0.view(), theta, tspan, tsteps, &self.options)?;
        Ok(full.select(Axis(0), &self.observed))
    }

    fn observed_len(&self) -> usize {
        self.observed.len()
    }
}

/// Closure-backed predictor.
pub struct FnPredictor<F> {
    observed_len: usize,
    f: F,
}

impl<F> FnPredictor<F>
where
    F: Fn(ArrayView1<'_, f64>, (f64, f64), ArrayView1<'_, f64>) -> Result<Trajectory, SolveFailure>
        + Send
        + Sync,
{
    pub fn new(observed_len: usize, f: F) -> Self {
        Self { observed_len, f }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(ArrayView1<'_, f64>, (f64, f64), ArrayView1<'_, f64>) -> Result<Trajectory, SolveFailure>
        + Send
        + Sync,
{
    fn predict(
        &self, theta: ArrayView1<'_, f64>, tspan: (f64, f64), tsteps: ArrayView1<'_, f64>,
    ) -> Result<Trajectory, SolveFailure> {
        (self.f)(theta, tspan, tsteps)
    }

    fn observed_len(&self) -> usize {
        self.observed_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{ArrayViewMut1, array};

    /// Two decoupled decays; only the second is observed.
    struct TwoDecays;

    impl OdeSystem for TwoDecays {
        fn dim(&self) -> usize {
            2
        }

        fn rhs(&self, _t: f64, u: ArrayView1<'_, f64>, theta: ArrayView1<'_, f64>, mut du: ArrayViewMut1<'_, f64>) {
            du[0] = -theta[0] * u[0];
            du[1] = -theta[1] * u[1];
        }
    }

    #[test]
    // Purpose
    // -------
    // The predictor returns only the observed rows of the solve.
    //
    // Given
    // -----
    // - Two decays with rates [1, 0.5], u0 = [1, 4], observed = [1].
    //
    // Expect
    // ------
    // - A 1 x 2 trajectory equal to 4 exp(-0.5 t).
    fn predict_restricts_to_observed_rows() {
        // Arrange
        let predictor =
            OdePredictor::new(TwoDecays, array![1.0, 4.0], vec![1], SolverOptions::default())
                .expect("valid predictor");
        let tsteps = array![1.0, 2.0];

        // Act
        let traj = predictor
            .predict(array![1.0, 0.5].view(), (0.0, 2.0), tsteps.view())
            .expect("stable solve");

        // Assert
        assert_eq!(traj.dim(), (1, 2));
        assert_eq!(predictor.observed_len(), 1);
        assert_relative_eq!(traj[[0, 0]], 4.0 * (-0.5f64).exp(), max_relative = 1e-4);
        assert_relative_eq!(traj[[0, 1]], 4.0 * (-1.0f64).exp(), max_relative = 1e-4);
    }

    #[test]
    fn construction_checks_dimensions() {
        let bad_u0 = OdePredictor::new(TwoDecays, array![1.0], vec![0], SolverOptions::default());
        assert!(matches!(bad_u0, Err(SolveFailure::DimensionMismatch { expected: 2, actual: 1 })));
        let bad_index = OdePredictor::new(TwoDecays, array![1.0, 1.0], vec![2], SolverOptions::default());
        assert!(matches!(bad_index, Err(SolveFailure::DimensionMismatch { actual: 2, .. })));
    }
}

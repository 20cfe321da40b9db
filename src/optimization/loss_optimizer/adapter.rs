//! Adapter that exposes an [`Objective`] as an `argmin` problem.
//!
//! The cost is the objective's `value` (which may advance a batch cursor).
//! Analytic gradients are used when the objective provides them; otherwise
//! finite differences are taken over `probe`, so the perturbation
//! evaluations all score the same batch as the cost call that preceded them.
use crate::optimization::{
    errors::OptError,
    loss_optimizer::{
        traits::Objective,
        types::{Cost, Grad, Theta},
        validation::validate_grad,
    },
};
use argmin::core::{CostFunction, Error, Gradient};
use finitediff::FiniteDiff;

/// Bridges an [`Objective`] to `argmin`'s `CostFunction` and `Gradient`.
#[derive(Debug, Clone)]
pub struct ArgMinAdapter<'a, F: Objective> {
    pub f: &'a F,
}

impl<'a, F: Objective> ArgMinAdapter<'a, F> {
    pub fn new(f: &'a F) -> Self {
        Self { f }
    }
}

impl<F: Objective> CostFunction for ArgMinAdapter<'_, F> {
    type Param = Theta;
    type Output = Cost;

    /// Evaluate the loss. `NaN` is reported as `+∞` so solvers compare it
    /// consistently.
    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        let value = self.f.value(theta);
        Ok(if value.is_nan() { f64::INFINITY } else { value })
    }
}

impl<F: Objective> Gradient for ArgMinAdapter<'_, F> {
    type Param = Theta;
    type Gradient = Grad;

    /// Evaluate the gradient of the loss at `θ`.
    ///
    /// Behavior:
    /// - If the objective implements `grad`, validate and return it.
    /// - Otherwise compute a *central* finite-difference gradient of `probe`;
    ///   if it is not finite (e.g. a perturbation left the stable region),
    ///   retry once with *forward* differences and validate again.
    ///
    /// # Errors
    /// - Propagates objective errors other than `GradientNotImplemented`.
    /// - Returns validation errors if the gradient has the wrong dimension or
    ///   non-finite entries after the forward retry.
    fn gradient(&self, theta: &Self::Param) -> Result<Self::Gradient, Error> {
        let dim = theta.len();
        match self.f.grad(theta) {
            Ok(g) => {
                validate_grad(&g, dim)?;
                Ok(g)
            }
            Err(OptError::GradientNotImplemented) => {
                let probe = |theta: &Theta| -> f64 { self.f.probe(theta) };
                let fd_grad = theta.central_diff(&probe);
                if validate_grad(&fd_grad, dim).is_ok() {
                    return Ok(fd_grad);
                }
                let fd_grad = theta.forward_diff(&probe);
                validate_grad(&fd_grad, dim)?;
                Ok(fd_grad)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimization::errors::OptResult;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use std::cell::Cell;

    // -------------------------------------------------------------------------
    // Scope
    // -----
    // Cost pass-through, analytic vs finite-difference gradients, and the
    // split between `value` (cursor-advancing) and `probe` (side-effect free).
    // -------------------------------------------------------------------------

    /// `L(θ) = Σ θ_i²`, counting `value` calls.
    struct Bowl {
        calls: Cell<usize>,
    }

    impl Objective for Bowl {
        fn value(&self, theta: &Theta) -> Cost {
            self.calls.set(self.calls.get() + 1);
            self.probe(theta)
        }

        fn probe(&self, theta: &Theta) -> Cost {
            theta.dot(theta)
        }
    }

    struct AnalyticBowl;

    impl Objective for AnalyticBowl {
        fn value(&self, theta: &Theta) -> Cost {
            theta.dot(theta)
        }

        fn grad(&self, theta: &Theta) -> OptResult<Grad> {
            Ok(theta * 2.0)
        }
    }

    /// Diverges (loss `+∞`) everywhere.
    struct Diverged;

    impl Objective for Diverged {
        fn value(&self, _theta: &Theta) -> Cost {
            f64::INFINITY
        }
    }

    #[test]
    // Purpose
    // -------
    // Finite differences use `probe`, so a gradient call does not advance the
    // objective's batch cursor.
    //
    // Given
    // -----
    // - `Bowl` at θ = [1, -2], which counts `value` calls.
    //
    // Expect
    // ------
    // - Gradient ≈ [2, -4]; `value` was called only by the explicit cost call.
    fn fd_gradient_uses_probe_not_value() {
        // Arrange
        let bowl = Bowl { calls: Cell::new(0) };
        let adapter = ArgMinAdapter::new(&bowl);
        let theta = array![1.0, -2.0];

        // Act
        let cost = adapter.cost(&theta).expect("cost never fails");
        let grad = adapter.gradient(&theta).expect("smooth objective");

        // Assert
        assert_abs_diff_eq!(cost, 5.0);
        assert_abs_diff_eq!(grad[0], 2.0, epsilon = 1e-5);
        assert_abs_diff_eq!(grad[1], -4.0, epsilon = 1e-5);
        assert_eq!(bowl.calls.get(), 1);
    }

    #[test]
    fn analytic_gradient_is_passed_through() {
        let adapter = ArgMinAdapter::new(&AnalyticBowl);
        let grad = adapter.gradient(&array![0.5, 1.5]).expect("analytic gradient");
        assert_eq!(grad, array![1.0, 3.0]);
    }

    #[test]
    // Purpose
    // -------
    // A diverged objective yields an infinite cost (legal) but its gradient is
    // rejected, which makes the stage fail instead of stepping on garbage.
    fn diverged_objective_has_infinite_cost_and_no_gradient() {
        let adapter = ArgMinAdapter::new(&Diverged);
        let theta = array![0.0];
        assert_eq!(adapter.cost(&theta).expect("cost never fails"), f64::INFINITY);
        let err = adapter.gradient(&theta).expect_err("gradient over +inf is undefined");
        assert!(matches!(OptError::from(err), OptError::InvalidGradient { .. }));
    }
}

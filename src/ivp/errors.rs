//! Failure signals produced by the IVP integrator.
use thiserror::Error;

/// Why an IVP solve did not produce a trajectory.
///
/// These are values handed back to callers (the loss evaluator turns them into
/// an infinite penalty), not conditions that abort training.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolveFailure {
    /// Step budget exhausted before reaching the final output time.
    #[error("Step budget of {max_steps} exhausted at t = {t}")]
    MaxStepsExceeded { t: f64, max_steps: usize },

    /// Adaptive step shrank below the minimum step size (stiffness/blow-up).
    #[error("Step size {h:e} underflowed at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },

    /// The state became NaN or infinite.
    #[error("Non-finite state at t = {t}")]
    NonFiniteState { t: f64 },

    /// Output times are unsorted or outside the integration span.
    #[error("Invalid output times: {reason}")]
    InvalidOutputTimes { reason: &'static str },

    /// Initial state length disagrees with the system dimension.
    #[error("Initial state has length {actual}, system dimension is {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Tolerances or fixed step must be finite and positive.
    #[error("Invalid solver setting {name} = {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

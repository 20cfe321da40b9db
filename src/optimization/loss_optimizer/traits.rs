//! Public API surface for stage optimization.
//!
//! - [`Objective`]: trait the loss evaluator implements.
//! - [`IterationCallback`]: per-iteration hook driven by every solver.
//! - [`StageOptimizer`] with [`AdamConfig`], [`LbfgsConfig`],
//!   [`NelderMeadConfig`]: configuration of one training stage's algorithm.
//! - [`LineSearcher`]: choice of line search used by L-BFGS.
//! - [`OptimOutcome`]: normalized result returned by [`minimize`](super::minimize).
//!
//! Convention: losses are minimized directly. A loss of `+∞` is a legal value
//! meaning "the trajectory diverged"; it is never turned into an error here.
use crate::optimization::{
    errors::{OptError, OptResult},
    loss_optimizer::{
        types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta},
        validation::{
            validate_theta_hat, validate_value, verify_positive, verify_tol_cost, verify_tol_grad,
            verify_unit_interval,
        },
    },
};
use argmin::core::TerminationStatus;
use argmin_math::ArgminL2Norm;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Scalar objective minimized by a stage.
///
/// Required:
/// - `value(&Theta) -> Cost`: the loss the optimizer sees. Implementations
///   may advance internal state (e.g. a batch cursor) on each call.
///
/// Optional:
/// - `probe(&Theta) -> Cost`: the same loss without side effects, used for
///   finite differences and for seeding a stage. Defaults to `value`.
/// - `grad(&Theta) -> OptResult<Grad>`: analytic gradient. If not
///   implemented, finite differences of `probe` are used automatically.
pub trait Objective {
    fn value(&self, theta: &Theta) -> Cost;

    fn probe(&self, theta: &Theta) -> Cost {
        self.value(theta)
    }

    fn grad(&self, _theta: &Theta) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }
}

/// Hook invoked once per completed optimizer iteration, in order.
///
/// Returning `Ok(true)` asks the optimizer to stop after this iteration;
/// returning `Err` aborts the run with [`OptError::Callback`].
pub trait IterationCallback {
    type Error: std::fmt::Display;

    fn on_iteration(&mut self, theta: &Theta, loss: Cost) -> Result<bool, Self::Error>;
}

/// Choice of line search used inside the L-BFGS solver.
///
/// Parsing accepts case-insensitive names with or without underscores
/// (`"MoreThuente"`, `"more_thuente"`, `"HAGERZHANG"`). Unknown names return
/// `OptError::InvalidLineSearch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "").as_str() {
            "morethuente" => Ok(LineSearcher::MoreThuente),
            "hagerzhang" => Ok(LineSearcher::HagerZhang),
            _ => Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Valid options are case insensitive 'MoreThuente' or 'HagerZhang'.",
            }),
        }
    }
}

/// Adam hyperparameters.
///
/// Default: `learning_rate = 1e-3`, `beta1 = 0.9`, `beta2 = 0.999`,
/// `epsilon = 1e-8`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self { learning_rate: 1e-3, beta1: 0.9, beta2: 0.999, epsilon: 1e-8 }
    }
}

impl AdamConfig {
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self { learning_rate, ..Self::default() }
    }
}

/// L-BFGS configuration.
///
/// Default: More–Thuente line search, memory [`DEFAULT_LBFGS_MEM`],
/// `tol_grad = 1e-6`, no cost tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LbfgsConfig {
    pub line_searcher: LineSearcher,
    pub memory: usize,
    pub tol_grad: Option<f64>,
    pub tol_cost: Option<f64>,
}

impl Default for LbfgsConfig {
    fn default() -> Self {
        Self {
            line_searcher: LineSearcher::MoreThuente,
            memory: DEFAULT_LBFGS_MEM,
            tol_grad: Some(1e-6),
            tol_cost: None,
        }
    }
}

/// Nelder–Mead configuration.
///
/// The initial simplex is `θ0` plus `θ0 + simplex_step · e_i` for each
/// coordinate `i`. Default: `simplex_step = 0.1`, `sd_tolerance = 1e-8`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NelderMeadConfig {
    pub simplex_step: f64,
    pub sd_tolerance: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self { simplex_step: 0.1, sd_tolerance: 1e-8 }
    }
}

/// Algorithm used by one training stage.
///
/// Serialized as an internally tagged table, e.g.
/// `{ kind = "adam", learning_rate = 0.01 }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOptimizer {
    Adam(AdamConfig),
    Lbfgs(LbfgsConfig),
    NelderMead(NelderMeadConfig),
}

impl StageOptimizer {
    /// Short name used in logs and stage reports.
    pub fn name(&self) -> &'static str {
        match self {
            StageOptimizer::Adam(_) => "adam",
            StageOptimizer::Lbfgs(_) => "lbfgs",
            StageOptimizer::NelderMead(_) => "nelder_mead",
        }
    }

    /// Check hyperparameters before any solver is built.
    ///
    /// # Errors
    /// - [`OptError::InvalidHyperParameter`] for out-of-range Adam or
    ///   Nelder–Mead settings.
    /// - [`OptError::InvalidLBFGSMem`], [`OptError::InvalidTolGrad`],
    ///   [`OptError::InvalidTolCost`] for L-BFGS settings.
    pub fn validate(&self) -> OptResult<()> {
        match self {
            StageOptimizer::Adam(cfg) => {
                verify_positive("learning_rate", cfg.learning_rate)?;
                verify_unit_interval("beta1", cfg.beta1)?;
                verify_unit_interval("beta2", cfg.beta2)?;
                verify_positive("epsilon", cfg.epsilon)
            }
            StageOptimizer::Lbfgs(cfg) => {
                if cfg.memory == 0 {
                    return Err(OptError::InvalidLBFGSMem {
                        mem: cfg.memory,
                        reason: "L-BFGS memory must be greater than zero.",
                    });
                }
                verify_tol_grad(cfg.tol_grad)?;
                verify_tol_cost(cfg.tol_cost)
            }
            StageOptimizer::NelderMead(cfg) => {
                verify_positive("simplex_step", cfg.simplex_step)?;
                verify_positive("sd_tolerance", cfg.sd_tolerance)
            }
        }
    }
}

impl Default for StageOptimizer {
    fn default() -> Self {
        StageOptimizer::Adam(AdamConfig::default())
    }
}

/// Canonical result returned by `minimize`.
///
/// - `theta_hat`: best parameter vector found by the solver.
/// - `value`: best loss reached.
/// - `converged`: `true` if the solver reported a terminating status other
///   than `NotTerminated` (an exhausted iteration budget counts).
/// - `status`: human-readable termination status string.
/// - `iterations`: number of optimizer iterations performed.
/// - `fn_evals`: function-evaluation counters reported by `argmin`.
/// - `grad_norm`: norm of the last available gradient, if present.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// Build a validated [`OptimOutcome`] from raw solver state.
    ///
    /// # Errors
    /// - Propagates any validation errors for `theta_hat` or `value`.
    pub fn new(
        theta_hat_opt: Option<Theta>, value: Cost, termination: TerminationStatus, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat_opt)?;
        validate_value(value)?;
        let (converged, status) = match termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            other => (true, format!("{other:?}")),
        };
        let grad_norm = grad.map(|g| g.l2_norm());
        Ok(Self {
            theta_hat,
            value,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm,
        })
    }
}

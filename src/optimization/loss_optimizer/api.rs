//! High-level entry point for minimizing a training [`Objective`] with the
//! algorithm chosen by a stage.
//!
//! This validates the inputs, wraps the objective in an [`ArgMinAdapter`],
//! builds the requested solver, attaches the [`ObserverBridge`] and delegates
//! the run to [`run_stage`].
use std::sync::{Arc, Mutex};

use crate::{
    optimization::{
        errors::{OptError, OptResult},
        loss_optimizer::{
            adapter::ArgMinAdapter,
            builders::{
                build_adam, build_nelder_mead, build_optimizer_hager_zhang,
                build_optimizer_more_thuente,
            },
            observer::ObserverBridge,
            run::run_stage,
            traits::{IterationCallback, LineSearcher, Objective, OptimOutcome, StageOptimizer},
            types::Theta,
            validation::validate_theta0,
        },
    },
    training::cancel::CancelToken,
};

/// Minimize `objective` from `theta0` for at most `max_iters` iterations.
///
/// Behavior
/// --------
/// - Rejects empty/non-finite `theta0`, invalid hyperparameters and a zero
///   budget before doing any work.
/// - Returns [`OptError::Cancelled`] immediately if `cancel` is already set.
/// - Invokes `callback` exactly once per completed iteration, in order, with
///   the solver's current parameters and loss, and honours its stop signal.
///
/// Parameters
/// ----------
/// - `objective`: the loss; `value` may advance a batch cursor.
/// - `optimizer`: algorithm and hyperparameters of this stage.
/// - `callback`: shared with the caller so its state can be read afterwards.
/// - `cancel`: checked at every iteration boundary.
///
/// Errors
/// ------
/// - [`OptError::Cancelled`] when the token is set before or during the run.
/// - [`OptError::Callback`] when the callback fails.
/// - Builder, solver and outcome-validation errors otherwise.
pub fn minimize<F, C>(
    objective: &F, theta0: Theta, optimizer: &StageOptimizer, max_iters: usize,
    callback: Arc<Mutex<C>>, cancel: &CancelToken,
) -> OptResult<OptimOutcome>
where
    F: Objective,
    C: IterationCallback + 'static,
{
    validate_theta0(&theta0)?;
    optimizer.validate()?;
    if max_iters == 0 {
        return Err(OptError::InvalidMaxIter {
            max_iter: max_iters,
            reason: "Maximum iterations must be greater than zero.",
        });
    }
    if cancel.is_cancelled() {
        return Err(OptError::Cancelled);
    }

    let problem = ArgMinAdapter::new(objective);
    let bridge = ObserverBridge::new(callback, cancel.clone());
    match optimizer {
        StageOptimizer::Adam(cfg) => {
            let solver = build_adam(cfg)?;
            run_stage(problem, solver, theta0, max_iters, bridge, |s| s.take_gradient())
        }
        StageOptimizer::Lbfgs(cfg) => match cfg.line_searcher {
            LineSearcher::MoreThuente => {
                let solver = build_optimizer_more_thuente(cfg)?;
                run_stage(problem, solver, theta0, max_iters, bridge, |s| s.take_gradient())
            }
            LineSearcher::HagerZhang => {
                let solver = build_optimizer_hager_zhang(cfg)?;
                run_stage(problem, solver, theta0, max_iters, bridge, |s| s.take_gradient())
            }
        },
        StageOptimizer::NelderMead(cfg) => {
            let solver = build_nelder_mead(cfg, &theta0)?;
            run_stage::<_, _, (), _>(problem, solver, theta0, max_iters, bridge, |_| None)
        }
    }
}

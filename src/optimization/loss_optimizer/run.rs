//! Execution helper that runs an `argmin` solver for one training stage and
//! returns a crate-friendly [`OptimOutcome`].
use argmin::core::{
    Executor, IterState, Solver, State, TerminationReason, TerminationStatus, observers::ObserverMode,
};

use crate::optimization::{
    errors::{OptError, OptResult},
    loss_optimizer::{
        observer::{ObserverBridge, SnapshotHandle},
        traits::{IterationCallback, OptimOutcome},
        types::{Cost, FnEvalMap, Grad, Theta},
    },
};

/// Iteration state shared by all stage solvers; `G` is `Grad` for
/// gradient-based solvers and `()` for Nelder–Mead.
pub type StageState<G> = IterState<Theta, G, (), (), (), Cost>;

/// Run an `argmin` solver from `theta0` for at most `max_iters` iterations.
///
/// Wires up the problem, the solver, the initial parameters, the iteration
/// budget and the [`ObserverBridge`] (attached with `ObserverMode::Always`
/// so the callback sees every iteration), then executes and converts the
/// final state into an [`OptimOutcome`].
///
/// Parameters
/// ----------
/// - `grad_of`: extracts the last gradient from the final state, if the
///   solver keeps one.
///
/// Errors
/// ------
/// - Any `argmin` runtime error (line-search failures, invalid gradients)
///   via `From<argmin::core::Error>`.
/// - [`OptError::Cancelled`] / [`OptError::Callback`] raised by the bridge.
/// - Validation errors from [`OptimOutcome::new`].
///
/// Notes
/// -----
/// - A stop request from the callback is not an error: the outcome is built
///   from the bridge's last snapshot with a `SolverExit` status.
pub fn run_stage<O, S, G, C>(
    problem: O, solver: S, theta0: Theta, max_iters: usize, bridge: ObserverBridge<C>,
    grad_of: fn(&mut StageState<G>) -> Option<Grad>,
) -> OptResult<OptimOutcome>
where
    S: Solver<O, StageState<G>>,
    G: Clone + 'static,
    C: IterationCallback + 'static,
{
    let snapshot = bridge.snapshot_handle();
    let executor = Executor::new(problem, solver)
        .configure(|state| state.param(theta0).max_iters(max_iters as u64))
        .add_observer(bridge, ObserverMode::Always);

    match executor.run() {
        Ok(result) => {
            let mut state = result.state().clone();
            let iterations = state.get_iter();
            let function_counts = state.get_func_counts().clone();
            let termination = state.get_termination_status().clone();
            let grad = grad_of(&mut state);
            OptimOutcome::new(
                state.take_best_param(),
                state.get_best_cost(),
                termination,
                iterations,
                function_counts,
                grad,
            )
        }
        Err(err) => match OptError::from(err) {
            OptError::StopRequested => outcome_from_snapshot(&snapshot),
            other => Err(other),
        },
    }
}

fn outcome_from_snapshot(snapshot: &SnapshotHandle) -> OptResult<OptimOutcome> {
    let last = snapshot.lock().ok().and_then(|slot| slot.clone());
    let Some(last) = last else {
        return Err(OptError::MissingThetaHat);
    };
    OptimOutcome::new(
        Some(last.best_param),
        last.best_cost,
        TerminationStatus::Terminated(TerminationReason::SolverExit(
            "stopped by iteration callback".to_string(),
        )),
        last.iterations,
        FnEvalMap::new(),
        None,
    )
}

//! loss_optimizer::builders — solver construction helpers.
//!
//! Purpose
//! -------
//! Provide small, focused builders for the solvers a training stage can use.
//! These helpers hide Argmin's generic wiring and apply the stage's
//! configuration (tolerances, memory size, simplex geometry, Adam moments) so
//! the runner can request a configured solver without touching Argmin types.
//!
//! Key behaviors
//! -------------
//! - Construct L-BFGS solvers with either Hager–Zhang or More–Thuente line
//!   search, applying optional gradient and cost-change tolerances via a
//!   shared [`configure_lbfgs`] helper.
//! - Construct a Nelder–Mead solver whose initial simplex is built around
//!   the stage's starting point.
//! - Construct the crate's [`Adam`] solver from validated hyperparameters.
//!
//! Conventions
//! -----------
//! - The builders do **not** set an initial parameter vector on the executor
//!   or `max_iters`; these are applied by the runner. Nelder–Mead is the
//!   exception by necessity: its simplex *is* its starting point.
//! - Errors are always reported via [`OptResult`]; the underlying
//!   `argmin::core::Error` values never leak across module boundaries.
use argmin::solver::quasinewton::LBFGS;

use crate::optimization::{
    errors::OptResult,
    loss_optimizer::{
        adam::Adam,
        traits::{AdamConfig, LbfgsConfig, NelderMeadConfig, StageOptimizer},
        types::{
            Cost, Grad, HagerZhangLS, LbfgsHagerZhang, LbfgsMoreThuente, MoreThuenteLS, Simplex,
            Theta,
        },
    },
};

/// Construct L-BFGS with Hager–Zhang line search and the configured memory
/// and tolerances.
///
/// Errors
/// ------
/// - `OptError` (via `From<argmin::core::Error>`) when Argmin rejects a
///   tolerance.
pub fn build_optimizer_hager_zhang(cfg: &LbfgsConfig) -> OptResult<LbfgsHagerZhang> {
    let lbfgs = LbfgsHagerZhang::new(HagerZhangLS::new(), cfg.memory);
    configure_lbfgs(lbfgs, cfg)
}

/// Construct L-BFGS with More–Thuente line search and the configured memory
/// and tolerances.
pub fn build_optimizer_more_thuente(cfg: &LbfgsConfig) -> OptResult<LbfgsMoreThuente> {
    let lbfgs = LbfgsMoreThuente::new(MoreThuenteLS::new(), cfg.memory);
    configure_lbfgs(lbfgs, cfg)
}

/// configure_lbfgs — apply optional tolerances to an L-BFGS solver.
///
/// Notes
/// -----
/// - When a tolerance is `None`, the corresponding `with_tolerance_*`
///   method is not called; Argmin's defaults remain in effect.
/// - Generic over the line-search type `L` so every L-BFGS variant shares
///   the same wiring.
pub fn configure_lbfgs<L>(
    mut solver: LBFGS<L, Theta, Grad, Cost>, cfg: &LbfgsConfig,
) -> OptResult<LBFGS<L, Theta, Grad, Cost>> {
    if let Some(g) = cfg.tol_grad {
        solver = solver.with_tolerance_grad(g)?;
    }
    if let Some(c) = cfg.tol_cost {
        solver = solver.with_tolerance_cost(c)?;
    }
    Ok(solver)
}

/// build_nelder_mead — simplex around `theta0`.
///
/// Parameters
/// ----------
/// - `cfg`: `&NelderMeadConfig`
///   `simplex_step` offsets each coordinate once; `sd_tolerance` stops the
///   run when the simplex's cost spread falls below it.
/// - `theta0`: `&Theta`
///   First vertex of the simplex.
///
/// Returns
/// -------
/// `OptResult<Simplex>` with `theta0.len() + 1` vertices.
pub fn build_nelder_mead(cfg: &NelderMeadConfig, theta0: &Theta) -> OptResult<Simplex> {
    let mut vertices = Vec::with_capacity(theta0.len() + 1);
    vertices.push(theta0.clone());
    for i in 0..theta0.len() {
        let mut vertex = theta0.clone();
        vertex[i] += cfg.simplex_step;
        vertices.push(vertex);
    }
    Ok(Simplex::new(vertices).with_sd_tolerance(cfg.sd_tolerance)?)
}

/// Construct the Adam solver.
pub fn build_adam(cfg: &AdamConfig) -> OptResult<Adam> {
    StageOptimizer::Adam(*cfg).validate()?;
    Ok(Adam::new(*cfg))
}

//! Explicit Runge–Kutta integration to a list of output times.
//!
//! Purpose
//! -------
//! Provide the default IVP collaborator used by
//! [`OdePredictor`](crate::training::predictor::OdePredictor). The solving
//! method and tolerances are carried in [`SolverOptions`] and fixed for the
//! lifetime of a predictor.
//!
//! Key behaviors
//! -------------
//! - [`IvpMethod::Dopri5`]: adaptive Dormand–Prince 5(4) with a mixed
//!   absolute/relative error norm and PI-free step control.
//! - [`IvpMethod::Rk4`]: classical fixed-step RK4; steps are shortened to land
//!   exactly on output times.
//! - Both methods stop at the first non-finite state and report it.
//!
//! Invariants & assumptions
//! ------------------------
//! - `tsteps` is sorted and lies within `tspan`; an output time equal to
//!   `tspan.0` returns the initial state.
//! - Integration runs forward in time only.
use ndarray::{Array1, Array2, ArrayView1, Zip};

use crate::ivp::{errors::SolveFailure, system::OdeSystem};

/// Integration scheme, chosen once per predictor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IvpMethod {
    /// Adaptive Dormand–Prince 5(4).
    Dopri5,
    /// Fixed-step classical Runge–Kutta with step `dt`.
    Rk4 { dt: f64 },
}

/// Solver configuration.
///
/// Default: Dopri5, `abstol = reltol = 1e-6`, `max_steps = 100_000`,
/// `min_step = 1e-10`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    pub method: IvpMethod,
    pub abstol: f64,
    pub reltol: f64,
    pub max_steps: usize,
    pub min_step: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self { method: IvpMethod::Dopri5, abstol: 1e-6, reltol: 1e-6, max_steps: 100_000, min_step: 1e-10 }
    }
}

impl SolverOptions {
    pub fn with_method(mut self, method: IvpMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_tolerances(mut self, abstol: f64, reltol: f64) -> Self {
        self.abstol = abstol;
        self.reltol = reltol;
        self
    }

    fn validate(&self) -> Result<(), SolveFailure> {
        let checks = [("abstol", self.abstol), ("reltol", self.reltol), ("min_step", self.min_step)];
        for (name, value) in checks {
            if !value.is_finite() || value <= 0.0 {
                return Err(SolveFailure::InvalidSetting { name, value });
            }
        }
        if let IvpMethod::Rk4 { dt } = self.method {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(SolveFailure::InvalidSetting { name: "dt", value: dt });
            }
        }
        Ok(())
    }
}

/// Integrate `system` from `u0` at `tspan.0` and sample at `tsteps`.
///
/// Returns
/// -------
/// `Array2<f64>` of shape `(system.dim(), tsteps.len())`.
///
/// Errors
/// ------
/// - [`SolveFailure::DimensionMismatch`] if `u0.len() != system.dim()`.
/// - [`SolveFailure::InvalidOutputTimes`] for unsorted or out-of-span times.
/// - [`SolveFailure::InvalidSetting`] for non-positive tolerances or step.
/// - [`SolveFailure::MaxStepsExceeded`], [`SolveFailure::StepSizeUnderflow`],
///   [`SolveFailure::NonFiniteState`] when integration diverges.
pub fn solve<S: OdeSystem + ?Sized>(
    system: &S, u0: ArrayView1<'_, f64>, theta: ArrayView1<'_, f64>, tspan: (f64, f64),
    tsteps: ArrayView1<'_, f64>, opts: &SolverOptions,
) -> Result<Array2<f64>, SolveFailure> {
    opts.validate()?;
    let dim = system.dim();
    if u0.len() != dim {
        return Err(SolveFailure::DimensionMismatch { expected: dim, actual: u0.len() });
    }
    check_output_times(tspan, tsteps)?;

    let mut out = Array2::<f64>::zeros((dim, tsteps.len()));
    let mut stepper = Stepper::new(system, theta.view(), dim);
    let mut u = u0.to_owned();
    let mut t = tspan.0;
    let mut h = initial_step(opts, tspan);
    let mut steps = 0usize;

    for (col, &t_out) in tsteps.iter().enumerate() {
        while t < t_out {
            if steps >= opts.max_steps {
                return Err(SolveFailure::MaxStepsExceeded { t, max_steps: opts.max_steps });
            }
            steps += 1;
            let remaining = t_out - t;
            match opts.method {
                IvpMethod::Rk4 { dt } => {
                    let step = dt.min(remaining);
                    stepper.rk4(t, &mut u, step);
                    t = if step == remaining { t_out } else { t + step };
                }
                IvpMethod::Dopri5 => {
                    let step = h.min(remaining);
                    let err = stepper.dopri5(t, &u, step, opts);
                    if err <= 1.0 {
                        u.assign(&stepper.y_new);
                        t = if step == remaining { t_out } else { t + step };
                    }
                    let factor = if err == 0.0 { 5.0 } else { (0.9 * err.powf(-0.2)).clamp(0.2, 5.0) };
                    if !factor.is_finite() {
                        return Err(SolveFailure::NonFiniteState { t });
                    }
                    h = step * factor;
                    if h < opts.min_step * t.abs().max(1.0) {
                        return Err(SolveFailure::StepSizeUnderflow { t, h });
                    }
                }
            }
            if u.iter().any(|v| !v.is_finite()) {
                return Err(SolveFailure::NonFiniteState { t });
            }
        }
        out.column_mut(col).assign(&u);
    }
    Ok(out)
}

fn check_output_times(tspan: (f64, f64), tsteps: ArrayView1<'_, f64>) -> Result<(), SolveFailure> {
    if !(tspan.0.is_finite() && tspan.1.is_finite()) || tspan.1 < tspan.0 {
        return Err(SolveFailure::InvalidOutputTimes { reason: "span must be finite and forward" });
    }
    let mut prev = tspan.0;
    for &t in tsteps.iter() {
        if !t.is_finite() || t < prev {
            return Err(SolveFailure::InvalidOutputTimes { reason: "times must be sorted" });
        }
        prev = t;
    }
    if prev > tspan.1 {
        return Err(SolveFailure::InvalidOutputTimes { reason: "times exceed the span" });
    }
    Ok(())
}

fn initial_step(opts: &SolverOptions, tspan: (f64, f64)) -> f64 {
    match opts.method {
        IvpMethod::Rk4 { dt } => dt,
        IvpMethod::Dopri5 => ((tspan.1 - tspan.0) / 100.0).clamp(1e-3, 0.1).max(opts.min_step),
    }
}

// ---- Dormand–Prince 5(4) tableau ----
const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 7] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0, 0.0],
    [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
];
// Difference between the 5th- and 4th-order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

/// Scratch buffers reused across steps of one solve.
struct Stepper<'a, S: ?Sized> {
    system: &'a S,
    theta: ArrayView1<'a, f64>,
    k: Vec<Array1<f64>>,
    y_tmp: Array1<f64>,
    y_new: Array1<f64>,
}

impl<'a, S: OdeSystem + ?Sized> Stepper<'a, S> {
    fn new(system: &'a S, theta: ArrayView1<'a, f64>, dim: usize) -> Self {
        Self {
            system,
            theta,
            k: (0..7).map(|_| Array1::zeros(dim)).collect(),
            y_tmp: Array1::zeros(dim),
            y_new: Array1::zeros(dim),
        }
    }

    fn eval(&mut self, stage: usize, t: f64) {
        let (system, theta) = (self.system, self.theta);
        system.rhs(t, self.y_tmp.view(), theta, self.k[stage].view_mut());
    }

    fn rk4(&mut self, t: f64, u: &mut Array1<f64>, h: f64) {
        self.y_tmp.assign(u);
        self.eval(0, t);
        for (stage, scale) in [(1usize, 0.5), (2, 0.5), (3, 1.0)] {
            self.y_tmp.assign(u);
            self.y_tmp.scaled_add(scale * h, &self.k[stage - 1]);
            self.eval(stage, t + scale * h);
        }
        Zip::from(u)
            .and(&self.k[0])
            .and(&self.k[1])
            .and(&self.k[2])
            .and(&self.k[3])
            .for_each(|y, &k1, &k2, &k3, &k4| *y += h / 6.0 * (k1 + 2.0 * k2 + 2.0 * k3 + k4));
    }

    /// Take one trial step of size `h`; leaves the 5th-order solution in
    /// `y_new` and returns the scaled error norm (accept when `<= 1`).
    fn dopri5(&mut self, t: f64, u: &Array1<f64>, h: f64, opts: &SolverOptions) -> f64 {
        for stage in 0..7 {
            self.y_tmp.assign(u);
            for (j, &a) in A[stage].iter().enumerate().take(stage) {
                if a != 0.0 {
                    self.y_tmp.scaled_add(h * a, &self.k[j]);
                }
            }
            if stage == 6 {
                self.y_new.assign(&self.y_tmp);
            }
            self.eval(stage, t + C[stage] * h);
        }
        let mut acc = 0.0;
        for i in 0..u.len() {
            let err: f64 = (0..7).map(|j| E[j] * self.k[j][i]).sum::<f64>() * h;
            let scale = opts.abstol + opts.reltol * u[i].abs().max(self.y_new[i].abs());
            acc += (err / scale).powi(2);
        }
        let norm = (acc / u.len().max(1) as f64).sqrt();
        if norm.is_nan() { f64::INFINITY } else { norm }
    }
}

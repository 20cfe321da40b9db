//! rust_epifit — fitting ODE-based epidemic models to observed time series.
//!
//! Purpose
//! -------
//! Serve as the crate root for the fitting pipeline: validated datasets, an
//! IVP solver, gradient-based and derivative-free optimizer stages, a
//! checkpointing training loop with a growing-window curriculum, and a
//! per-location experiment runner with forecast evaluation.
//!
//! Key behaviors
//! -------------
//! - [`data`] holds ground truth, training windows and batch cursors.
//! - [`ivp`] integrates an [`ivp::OdeSystem`] at requested output times.
//! - [`optimization`] runs one optimizer stage over an objective through
//!   `argmin`, honouring an iteration callback and a cancellation token.
//! - [`training`] turns predictions into losses, checkpoints progress and
//!   sequences stages and curriculum windows.
//! - [`experiment`] fans the pipeline across locations and scores forecasts.
//!
//! Invariants & assumptions
//! ------------------------
//! - A failed or diverging solve is a loss of `+∞`, never an error.
//! - Parameters are flat `f64` vectors whose meaning belongs to the caller's
//!   predictor.
//!
//! Conventions
//! -----------
//! - Each area defines its own `thiserror` enum and result alias in an
//!   `errors.rs` module.
//! - Events go through `tracing`; the library never installs a subscriber.
//!
//! Testing notes
//! -------------
//! - Unit tests live next to the code they cover; end-to-end training and
//!   experiment scenarios live under `tests/`.

pub mod data;
pub mod experiment;
pub mod ivp;
pub mod optimization;
pub mod training;

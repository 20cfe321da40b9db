//! Rendering collaborator.
//!
//! Renderers turn a [`FitFrame`] (ground truth plus the current model fit)
//! into an image or an animation frame. They are not re-entrant: callers
//! share one renderer behind a [`SharedRenderer`] lock and hold it for the
//! whole evaluation/rendering step.
use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{
    data::TimeseriesDataset,
    experiment::errors::RenderError,
    optimization::Theta,
    training::Predictor,
};

pub trait Renderer: Send {
    fn render(&mut self, frame: &FitFrame) -> Result<(), RenderError>;
}

/// Exclusive-use handle shared by every task of an experiment.
pub type SharedRenderer = Arc<Mutex<Box<dyn Renderer>>>;

pub fn shared<R: Renderer + 'static>(renderer: R) -> SharedRenderer {
    Arc::new(Mutex::new(Box::new(renderer)))
}

/// Fit of one location after a training window.
///
/// `prediction` is `None` when the model could not be solved with the
/// current parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFrame {
    pub label: String,
    pub window: usize,
    pub tsteps: Vec<f64>,
    pub truth: Vec<Vec<f64>>,
    pub prediction: Option<Vec<Vec<f64>>>,
}

impl FitFrame {
    /// Predict over the whole dataset with `theta`.
    pub fn capture<P: Predictor + ?Sized>(
        label: &str, window: usize, predictor: &P, dataset: &TimeseriesDataset, theta: &Theta,
    ) -> Self {
        let rows = |a: ArrayView2<'_, f64>| -> Vec<Vec<f64>> { a.rows().into_iter().map(|r| r.to_vec()).collect() };
        let prediction = predictor
            .predict(theta.view(), dataset.tspan(), dataset.tsteps())
            .ok()
            .map(|pred| rows(pred.view()));
        Self {
            label: label.to_string(),
            window,
            tsteps: dataset.tsteps().to_vec(),
            truth: rows(dataset.data()),
            prediction,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&mut self, _frame: &FitFrame) -> Result<(), RenderError> {
        Ok(())
    }
}

/// Appends each frame as one JSON line, for later assembly into an
/// animation.
#[derive(Debug, Clone)]
pub struct FrameRecorder {
    path: PathBuf,
    frames: usize,
}

impl FrameRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), frames: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Renderer for FrameRecorder {
    fn render(&mut self, frame: &FitFrame) -> Result<(), RenderError> {
        let io_err = |source| RenderError::Io { path: self.path.clone(), source };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, frame)?;
        writer.write_all(b"\n").map_err(io_err)?;
        writer.flush().map_err(io_err)?;
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ivp::SolveFailure, training::FnPredictor};
    use ndarray::{ArrayView1, array};

    #[test]
    // Purpose
    // -------
    // Frames are appended as JSON lines that decode back to the same frame;
    // a predictor failure yields a frame without prediction.
    fn recorder_appends_json_lines() {
        // Arrange
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = TimeseriesDataset::from_daily(array![[1.0, 2.0, 3.0]], 0.0).expect("dataset");
        let echo = FnPredictor::new(1, |theta: ArrayView1<'_, f64>, _, tsteps: ArrayView1<'_, f64>| {
            Ok(tsteps.mapv(|t| t * theta[0]).insert_axis(ndarray::Axis(0)))
        });
        let failing = FnPredictor::new(1, |_: ArrayView1<'_, f64>, _, _: ArrayView1<'_, f64>| {
            Err(SolveFailure::NonFiniteState { t: 1.0 })
        });
        let mut recorder = FrameRecorder::new(dir.path().join("frames/fit.jsonl"));
        let ok = FitFrame::capture("loc", 2, &echo, &dataset, &array![2.0]);
        let diverged = FitFrame::capture("loc", 3, &failing, &dataset, &array![2.0]);

        // Act
        recorder.render(&ok).expect("render");
        recorder.render(&diverged).expect("render");

        // Assert
        let text = std::fs::read_to_string(recorder.path()).expect("read");
        let frames: Vec<FitFrame> =
            text.lines().map(|l| serde_json::from_str(l).expect("json line")).collect();
        assert_eq!(recorder.frames(), 2);
        assert_eq!(frames, vec![ok.clone(), diverged]);
        assert_eq!(ok.prediction, Some(vec![vec![0.0, 2.0, 4.0]]));
        assert_eq!(frames[1].prediction, None);
    }
}

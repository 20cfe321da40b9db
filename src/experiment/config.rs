//! TOML experiment configuration.
//!
//! A config file names the locations, the optimizer stages and the knobs of
//! checkpointing, evaluation and execution. It converts into a
//! [`TrainingPlan`] and a configured [`ExperimentRunner`]:
//!
//! ```toml
//! output_dir = "runs"
//! locations = ["north", "south"]
//! execution = { kind = "parallel", workers = 4 }
//!
//! [checkpoint]
//! param_interval = 5
//!
//! [[stages]]
//! name = "adam"
//! max_iters = 200
//! optimizer = { kind = "adam", learning_rate = 0.05 }
//!
//! [curriculum]
//! initial_window = 14
//! window_step = 7
//! ```
use std::{collections::HashSet, fs, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};

use crate::{
    experiment::{
        errors::ConfigError,
        runner::{EvaluationSettings, ExecutionMode, ExperimentRunner, SharedResources, TrainingPlan},
    },
    training::{CancelToken, CheckpointConfig, CurriculumConfig, TrainingStage},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub output_dir: PathBuf,
    pub locations: Vec<String>,
    #[serde(default)]
    pub execution: ExecutionMode,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    /// Batch size of a plain session; `0` means one batch.
    #[serde(default)]
    pub batch_size: usize,
    pub stages: Vec<TrainingStage>,
    /// Switches the plan to a growing-window curriculum.
    #[serde(default)]
    pub curriculum: Option<CurriculumConfig>,
    /// Full-horizon stages after the curriculum.
    #[serde(default)]
    pub final_stages: Vec<TrainingStage>,
}

impl ExperimentConfig {
    /// Parse and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Checks that need no data: the window schedule itself is checked again
    /// against each location's dataset length.
    ///
    /// Errors
    /// ------
    /// - [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: String| Err(ConfigError::Invalid { field, reason });

        if self.locations.is_empty() {
            return invalid("locations", "at least one location is required".to_string());
        }
        let mut seen = HashSet::new();
        for location in &self.locations {
            if location.is_empty() || location.contains(['/', '\\']) {
                return invalid("locations", format!("'{location}' is not a usable directory name"));
            }
            if !seen.insert(location.as_str()) {
                return invalid("locations", format!("'{location}' is listed twice"));
            }
        }

        if self.stages.is_empty() {
            return invalid("stages", "at least one stage is required".to_string());
        }
        for stage in &self.stages {
            if let Err(err) = stage.validate() {
                return invalid("stages", err.to_string());
            }
        }
        for stage in &self.final_stages {
            if let Err(err) = stage.validate() {
                return invalid("final_stages", err.to_string());
            }
        }
        if let Err(err) = self.checkpoint.validate() {
            return invalid("checkpoint", err.to_string());
        }
        if self.evaluation.horizons.contains(&0) {
            return invalid("evaluation.horizons", "horizons must be positive".to_string());
        }

        match &self.curriculum {
            None if !self.final_stages.is_empty() => {
                invalid("final_stages", "final stages need a [curriculum] section".to_string())
            }
            Some(curriculum) if curriculum.initial_window == 0 => {
                invalid("curriculum.initial_window", "must be positive".to_string())
            }
            Some(curriculum) if curriculum.horizon == Some(0) => {
                invalid("curriculum.horizon", "must be positive".to_string())
            }
            Some(curriculum) if curriculum.base_iters == 0 && curriculum.iters_per_step == 0 => {
                invalid("curriculum.base_iters", "base_iters and iters_per_step cannot both be zero".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn plan(&self) -> TrainingPlan {
        match &self.curriculum {
            Some(config) => TrainingPlan::Curriculum {
                config: config.clone(),
                stages: self.stages.clone(),
                final_stages: self.final_stages.clone(),
            },
            None => TrainingPlan::Session { stages: self.stages.clone(), batch_size: self.batch_size },
        }
    }

    pub fn runner(&self, resources: SharedResources, cancel: CancelToken) -> ExperimentRunner {
        ExperimentRunner::new(&self.output_dir, self.execution, resources, cancel)
            .with_checkpoint(self.checkpoint.clone())
            .with_evaluation(self.evaluation.clone())
    }
}

//! Experiment configuration, read from JSON.
//!
//! Every field has a default, so `{}` is a valid configuration file:
//!
//! ```json
//! {
//!   "task": { "len_wait": 100, "len_sequence": 10, "num_symbols": 8 },
//!   "model": { "hidden_size": 64, "embedding_size": 16 },
//!   "training": { "method": "adamw", "iterations": 2000, "seed": 1 }
//! }
//! ```

use crate::adamw::AdamWConfiguration;
use crate::error::{CopyTaskError, Result};
use crate::model::ModelConfig;
use crate::task::CopyTask;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TrainingMethod {
    /// Backpropagation through time with AdamW.
    AdamW,
    /// Gradient-free neuroevolution (CoSyNE).
    Cosyne,
}

impl std::str::FromStr for TrainingMethod {
    type Err = CopyTaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "adamw" => Ok(TrainingMethod::AdamW),
            "cosyne" => Ok(TrainingMethod::Cosyne),
            _ => Err(CopyTaskError::Config(format!(
                "unknown training method {:?} (expected adamw or cosyne)",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CosyneConfig {
    pub sigma: f64,
    pub shrinkage_multiplier: f64,
    /// Check the score curve every this many iterations and halve sigma if it went flat.
    pub sigma_decay_every: usize,
}

impl Default for CosyneConfig {
    fn default() -> Self {
        CosyneConfig {
            sigma: 0.1,
            shrinkage_multiplier: 0.98,
            sigma_decay_every: 200,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainingConfig {
    pub method: TrainingMethod,
    pub iterations: usize,
    pub batch_size: usize,
    pub eval_batch_size: usize,
    pub log_every: usize,
    pub seed: u64,
    pub adamw: AdamWConfiguration,
    pub cosyne: CosyneConfig,
    /// Number of logged evaluations the plateau check looks at. `None` disables early stopping.
    pub plateau_window: Option<usize>,
    pub plateau_threshold: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            method: TrainingMethod::AdamW,
            iterations: 2000,
            batch_size: 32,
            eval_batch_size: 128,
            log_every: 50,
            seed: 1,
            adamw: AdamWConfiguration::new().gradient_clip(1.0),
            cosyne: CosyneConfig::default(),
            plateau_window: None,
            plateau_threshold: 0.05,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub task: CopyTask,
    pub model: ModelConfig,
    pub training: TrainingConfig,
}

fn require_positive(name: &'static str, value: usize) -> Result<()> {
    if value < 1 {
        return Err(CopyTaskError::invalid(name, value, "must be at least 1"));
    }
    Ok(())
}

impl ExperimentConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ExperimentConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.task.validate()?;
        self.model.validate()?;

        let t = &self.training;
        require_positive("iterations", t.iterations)?;
        require_positive("batch_size", t.batch_size)?;
        require_positive("eval_batch_size", t.eval_batch_size)?;
        require_positive("log_every", t.log_every)?;
        require_positive("cosyne.sigma_decay_every", t.cosyne.sigma_decay_every)?;

        let lr = t.adamw.get_learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(CopyTaskError::Config(format!(
                "adamw learning rate must be positive, got {}",
                lr
            )));
        }
        if !(t.cosyne.sigma.is_finite() && t.cosyne.sigma > 0.0) {
            return Err(CopyTaskError::Config(format!(
                "cosyne sigma must be positive, got {}",
                t.cosyne.sigma
            )));
        }
        if let Some(window) = t.plateau_window {
            if window < 3 {
                return Err(CopyTaskError::invalid(
                    "plateau_window",
                    window,
                    "needs at least 3 points to fit a trend",
                ));
            }
        }
        if !(t.plateau_threshold > 0.0 && t.plateau_threshold < 1.0) {
            return Err(CopyTaskError::Config(format!(
                "plateau_threshold must be inside (0, 1), got {}",
                t.plateau_threshold
            )));
        }
        Ok(())
    }
}

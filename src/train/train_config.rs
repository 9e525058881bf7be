use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use crate::error::{TrainError, TrainResult};

/// What to do when a training batch produces a NaN or infinite loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonFinitePolicy {
    /// Stop the run with `TrainError::NonFiniteLoss`.
    #[default]
    Abort,
    /// Leave the parameters untouched, keep the batch out of the epoch sums
    /// and log a warning. The global step still advances.
    SkipBatch,
}

/// Run-level settings for the orchestrator and both loops.
///
/// # Fields
/// - `epochs`            - number of passes over the training loader
/// - `display_interval`  - batches between progress records
/// - `batch_max_length`  - longest label the codec encodes
/// - `grad_clip_norm`    - ceiling on the global gradient L2 norm
/// - `checkpoint_dir`    - where `model_latest.json` / `model_best.json` go
/// - `non_finite_loss`   - reaction to a NaN/inf batch loss
/// - `ctc_zero_infinity` - CTC scores labels too long for the output as zero loss
/// - `eval_max_batches`  - optional cap on validation batches per epoch
/// - `resume_checkpoint` - continue from this checkpoint instead of epoch 1
/// - `show_progress`     - draw a progress bar during validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub epochs: usize,
    #[serde(default = "default_display_interval")]
    pub display_interval: usize,
    #[serde(default = "default_batch_max_length")]
    pub batch_max_length: usize,
    #[serde(default = "default_grad_clip_norm")]
    pub grad_clip_norm: f64,
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    #[serde(default)]
    pub non_finite_loss: NonFinitePolicy,
    #[serde(default)]
    pub ctc_zero_infinity: bool,
    #[serde(default)]
    pub eval_max_batches: Option<usize>,
    #[serde(default)]
    pub resume_checkpoint: Option<PathBuf>,
    #[serde(default)]
    pub show_progress: bool,
}

fn default_display_interval() -> usize {
    100
}

fn default_batch_max_length() -> usize {
    25
}

fn default_grad_clip_norm() -> f64 {
    5.0
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("checkpoints")
}

impl TrainConfig {
    /// A config with every optional field at its default.
    pub fn new(epochs: usize, checkpoint_dir: impl Into<PathBuf>) -> Self {
        TrainConfig {
            epochs,
            display_interval: default_display_interval(),
            batch_max_length: default_batch_max_length(),
            grad_clip_norm: default_grad_clip_norm(),
            checkpoint_dir: checkpoint_dir.into(),
            non_finite_loss: NonFinitePolicy::default(),
            ctc_zero_infinity: false,
            eval_max_batches: None,
            resume_checkpoint: None,
            show_progress: false,
        }
    }

    pub fn validate(&self) -> TrainResult<()> {
        if self.epochs == 0 {
            return Err(TrainError::InvalidConfig("epochs must be at least 1".into()));
        }
        if self.display_interval == 0 {
            return Err(TrainError::InvalidConfig("display_interval must be at least 1".into()));
        }
        if self.batch_max_length == 0 {
            return Err(TrainError::InvalidConfig("batch_max_length must be at least 1".into()));
        }
        if !(self.grad_clip_norm > 0.0) {
            return Err(TrainError::InvalidConfig(format!(
                "grad_clip_norm must be positive, got {}",
                self.grad_clip_norm
            )));
        }
        if self.eval_max_batches == Some(0) {
            return Err(TrainError::InvalidConfig("eval_max_batches must be at least 1 when set".into()));
        }
        Ok(())
    }

    /// Path of the checkpoint written after every epoch.
    pub fn latest_checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir.join("model_latest.json")
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> TrainResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> TrainResult<TrainConfig> {
        let reader = BufReader::new(File::open(path)?);
        let config: TrainConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: TrainConfig = serde_json::from_str(r#"{"epochs": 3}"#).unwrap();
        assert_eq!(config, TrainConfig::new(3, "checkpoints"));
        assert_eq!(config.grad_clip_norm, 5.0);
        assert_eq!(config.non_finite_loss, NonFinitePolicy::Abort);
    }

    #[test]
    fn policy_is_snake_case() {
        let config: TrainConfig =
            serde_json::from_str(r#"{"epochs": 1, "non_finite_loss": "skip_batch"}"#).unwrap();
        assert_eq!(config.non_finite_loss, NonFinitePolicy::SkipBatch);
    }

    #[test]
    fn rejects_degenerate_values() {
        let mut config = TrainConfig::new(1, "c");
        config.display_interval = 0;
        assert!(matches!(config.validate(), Err(TrainError::InvalidConfig(_))));
        let mut config = TrainConfig::new(0, "c");
        assert!(config.validate().is_err());
        config.epochs = 1;
        config.grad_clip_norm = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        let mut config = TrainConfig::new(4, dir.path().join("ckpt"));
        config.eval_max_batches = Some(2);
        config.save_json(&path).unwrap();
        assert_eq!(TrainConfig::load_json(&path).unwrap(), config);
    }
}

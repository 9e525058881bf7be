use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Serialize, Deserialize};
use tracing::info;

use crate::checkpoint::JsonCheckpointStore;
use crate::codec::{AttnCodec, Charset, CtcCodec, LabelCodec};
use crate::data::{load_line_dataset, DataLoader, InMemoryLoader, Sample, SyntheticLines};
use crate::error::{TrainError, TrainResult};
use crate::model::{build_model, ModelConfig, PredictionMode};
use crate::optim::sgd::{Sgd, SgdConfig};
use crate::telemetry::{JsonlSink, MetricsSink, NullSink};
use crate::train::{TrainConfig, TrainContext, TrainingOrchestrator};

/// Where a split's samples come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// Image files listed in a tab-separated `path<TAB>label` file.
    LineImages { root: PathBuf, labels: PathBuf },
    /// Rendered on the fly from the experiment charset.
    Synthetic {
        count: usize,
        min_len: usize,
        max_len: usize,
        #[serde(default = "default_glyph_width")]
        glyph_width: usize,
        #[serde(default)]
        noise: f64,
    },
}

fn default_glyph_width() -> usize {
    2
}

fn default_seed() -> u64 {
    42
}

/// A complete run description, as read by the `ferrite-ocr` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    pub charset: String,
    pub model: ModelConfig,
    pub optimizer: SgdConfig,
    pub batch_size: usize,
    pub train_data: DataSource,
    #[serde(default)]
    pub val_data: Option<DataSource>,
    pub train: TrainConfig,
    /// JSON-lines metrics file; telemetry is off when absent.
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

impl ExperimentConfig {
    pub fn validate(&self) -> TrainResult<()> {
        if self.charset.is_empty() {
            return Err(TrainError::InvalidConfig("charset is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be at least 1".into()));
        }
        self.model.validate()?;
        self.train.validate()?;
        for source in std::iter::once(&self.train_data).chain(self.val_data.as_ref()) {
            if let DataSource::Synthetic { count, min_len, max_len, .. } = source {
                if *count == 0 || min_len > max_len {
                    return Err(TrainError::InvalidConfig(format!(
                        "synthetic split needs count >= 1 and min_len <= max_len (got {count}, {min_len}..{max_len})"
                    )));
                }
                if *max_len > self.train.batch_max_length {
                    return Err(TrainError::InvalidConfig(format!(
                        "synthetic max_len {max_len} exceeds batch_max_length {}",
                        self.train.batch_max_length
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> TrainResult<ExperimentConfig> {
        let reader = BufReader::new(File::open(path)?);
        let config: ExperimentConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> TrainResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// The codec matching the model's prediction mode.
    pub fn build_codec(&self) -> TrainResult<Box<dyn LabelCodec>> {
        let charset = Charset::new(&self.charset)?;
        Ok(match self.model.mode {
            PredictionMode::SequenceAlignmentFree => Box::new(CtcCodec::new(charset)),
            PredictionMode::AutoregressiveAttention => Box::new(AttnCodec::new(charset)),
        })
    }

    fn load_samples(&self, source: &DataSource, rng: &mut StdRng) -> TrainResult<Vec<Sample>> {
        match source {
            DataSource::LineImages { root, labels } => load_line_dataset(root, labels, self.model.image_height),
            DataSource::Synthetic { count, min_len, max_len, glyph_width, noise } => {
                SyntheticLines::new(&self.charset, self.model.image_height, *glyph_width, *noise)?
                    .generate(*count, *min_len, *max_len, rng)
            }
        }
    }

    /// Wires every collaborator for a run: codec, model, optimizer, loaders,
    /// metrics sink and JSON checkpoints under `train.checkpoint_dir`.
    pub fn build_orchestrator(&self) -> TrainResult<TrainingOrchestrator> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let codec = self.build_codec()?;
        let model = build_model(&self.model, codec.num_classes(), self.train.batch_max_length, &mut rng)?;
        let optimizer = Sgd::from_config(&self.optimizer)?;

        let train_samples = self.load_samples(&self.train_data, &mut rng)?;
        let train_loader: Box<dyn DataLoader> =
            Box::new(InMemoryLoader::new(train_samples, self.batch_size, true, self.seed)?);
        let val_loader = match &self.val_data {
            Some(source) => {
                let samples = self.load_samples(source, &mut rng)?;
                Some(Box::new(InMemoryLoader::new(samples, self.batch_size, false, self.seed)?) as Box<dyn DataLoader>)
            }
            None => None,
        };

        let sink: Box<dyn MetricsSink> = match &self.metrics_path {
            Some(path) => {
                info!("writing metrics to {}", path.display());
                Box::new(JsonlSink::create(path)?)
            }
            None => Box::new(NullSink),
        };

        let ctx = TrainContext::new(self.train.clone(), codec, sink);
        TrainingOrchestrator::new(
            ctx,
            model,
            Box::new(optimizer),
            train_loader,
            val_loader,
            Box::new(JsonCheckpointStore::new()),
        )
    }
}

pub mod math;
pub mod activation;
pub mod layers;
pub mod data;
pub mod codec;
pub mod model;
pub mod loss;
pub mod optim;
pub mod telemetry;
pub mod checkpoint;
pub mod train;
pub mod config;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use math::tensor::Tensor3;
pub use activation::activation::ActivationFunction;
pub use codec::{AttnCodec, CtcCodec, LabelCodec};
pub use data::{Batch, DataLoader, InMemoryLoader};
pub use model::{PredictionMode, RecognitionModel};
pub use loss::LossStrategy;
pub use optim::{Optimizer, Sgd};
pub use telemetry::{MetricsSink, NullSink};
pub use checkpoint::{JsonCheckpointStore, PersistenceBackend};
pub use train::{BestMetrics, TrainConfig, TrainContext, TrainingOrchestrator};
pub use config::ExperimentConfig;
pub use error::{TrainError, TrainResult};

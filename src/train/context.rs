use crate::codec::LabelCodec;
use crate::telemetry::{MetricsSink, NullSink};
use crate::train::step::GlobalStep;
use crate::train::train_config::TrainConfig;

/// Shared state handed explicitly to both loops and the orchestrator.
pub struct TrainContext {
    pub config: TrainConfig,
    pub codec: Box<dyn LabelCodec>,
    pub sink: Box<dyn MetricsSink>,
    pub global_step: GlobalStep,
}

impl TrainContext {
    pub fn new(config: TrainConfig, codec: Box<dyn LabelCodec>, sink: Box<dyn MetricsSink>) -> Self {
        TrainContext { config, codec, sink, global_step: GlobalStep::new() }
    }

    /// Telemetry disabled.
    pub fn without_metrics(config: TrainConfig, codec: Box<dyn LabelCodec>) -> Self {
        TrainContext::new(config, codec, Box::new(NullSink))
    }
}

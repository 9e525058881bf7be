use thiserror::Error;

pub type TrainResult<T> = std::result::Result<T, TrainError>;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error("unsupported prediction mode: {0}")]
    UnsupportedMode(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("empty dataset: {0}")]
    EmptyDataset(String),

    #[error("non-finite loss {loss} at epoch {epoch}, global step {step}")]
    NonFiniteLoss { epoch: usize, step: u64, loss: f64 },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl TrainError {
    pub(crate) fn shape(message: impl Into<String>) -> Self {
        TrainError::ShapeMismatch(message.into())
    }
}

pub mod cross_entropy;
pub mod ctc;
pub mod strategy;

pub use cross_entropy::CrossEntropyLoss;
pub use ctc::{CtcLoss, CtcOutput};
pub use strategy::{LossOutput, LossStrategy};

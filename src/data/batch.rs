use crate::data::raster::{ImageBatch, LineImage};
use crate::error::{TrainError, TrainResult};

/// One labelled text line.
#[derive(Debug, Clone)]
pub struct Sample {
    pub image: LineImage,
    pub label: String,
}

/// Images plus their ground-truth strings, in the same order.
#[derive(Debug, Clone)]
pub struct Batch {
    pub images: ImageBatch,
    pub labels: Vec<String>,
}

impl Batch {
    pub fn new(images: ImageBatch, labels: Vec<String>) -> TrainResult<Batch> {
        if labels.len() != images.batch {
            return Err(TrainError::shape(format!(
                "batch holds {} images but {} labels",
                images.batch,
                labels.len()
            )));
        }
        Ok(Batch { images, labels })
    }

    pub fn from_samples(samples: &[&Sample]) -> TrainResult<Batch> {
        let images: Vec<&LineImage> = samples.iter().map(|s| &s.image).collect();
        let labels = samples.iter().map(|s| s.label.clone()).collect();
        Batch::new(ImageBatch::stack(&images)?, labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

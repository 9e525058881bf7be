use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::data::batch::{Batch, Sample};
use crate::error::{TrainError, TrainResult};

/// Source of batches for one pass over a dataset.
///
/// `batch_count` is the declared number of batches per pass and may be lower
/// than what `batches` actually yields; consumers stop at the declared count.
pub trait DataLoader {
    fn batch_count(&self) -> usize;

    /// Number of samples in the underlying dataset.
    fn dataset_len(&self) -> usize;

    fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<Batch>> + '_>;
}

/// Holds every sample in memory and cuts fresh batches on each pass.
pub struct InMemoryLoader {
    samples: Vec<Sample>,
    batch_size: usize,
    shuffle: bool,
    declared_batches: Option<usize>,
    rng: StdRng,
}

impl InMemoryLoader {
    /// # Errors
    /// `InvalidConfig` for a zero batch size, `ShapeMismatch` if the samples do
    /// not share one image height.
    pub fn new(samples: Vec<Sample>, batch_size: usize, shuffle: bool, seed: u64) -> TrainResult<Self> {
        if batch_size == 0 {
            return Err(TrainError::InvalidConfig("batch_size must be at least 1".into()));
        }
        if let Some(first) = samples.first() {
            if let Some(bad) = samples.iter().find(|s| s.image.height != first.image.height) {
                return Err(TrainError::shape(format!(
                    "sample '{}' has height {}, expected {}",
                    bad.label, bad.image.height, first.image.height
                )));
            }
        }
        Ok(InMemoryLoader {
            samples,
            batch_size,
            shuffle,
            declared_batches: None,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Declares at most `limit` batches per pass without shortening the
    /// iterator itself.
    pub fn with_declared_batches(mut self, limit: usize) -> Self {
        self.declared_batches = Some(limit);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl DataLoader for InMemoryLoader {
    fn batch_count(&self) -> usize {
        let full = self.samples.len().div_ceil(self.batch_size);
        match self.declared_batches {
            Some(limit) => full.min(limit),
            None => full,
        }
    }

    fn dataset_len(&self) -> usize {
        self.samples.len()
    }

    fn batches(&mut self) -> Box<dyn Iterator<Item = TrainResult<Batch>> + '_> {
        let mut order: Vec<usize> = (0..self.samples.len()).collect();
        if self.shuffle {
            order.shuffle(&mut self.rng);
        }
        let samples = &self.samples;
        let batch_size = self.batch_size;
        Box::new((0..order.len()).step_by(batch_size).map(move |start| {
            let end = (start + batch_size).min(order.len());
            let chunk: Vec<&Sample> = order[start..end].iter().map(|&i| &samples[i]).collect();
            Batch::from_samples(&chunk)
        }))
    }
}

pub mod batch;
pub mod raster;
pub mod line_images;
pub mod loader;
pub mod synthetic;

pub use batch::{Batch, Sample};
pub use raster::{ImageBatch, LineImage};
pub use line_images::load_line_dataset;
pub use loader::{DataLoader, InMemoryLoader};
pub use synthetic::SyntheticLines;

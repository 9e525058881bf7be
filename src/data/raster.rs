use crate::error::{TrainError, TrainResult};
use crate::math::matrix::Matrix;

/// A single grayscale text-line image, row-major `[height][width]`,
/// intensities in [0, 1] with ink = 1.
#[derive(Debug, Clone, PartialEq)]
pub struct LineImage {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<f64>,
}

impl LineImage {
    pub fn new(height: usize, width: usize, pixels: Vec<f64>) -> TrainResult<LineImage> {
        if pixels.len() != height * width {
            return Err(TrainError::shape(format!(
                "line image {height}x{width} needs {} pixels, got {}",
                height * width,
                pixels.len()
            )));
        }
        Ok(LineImage { height, width, pixels })
    }

    pub fn blank(height: usize, width: usize) -> LineImage {
        LineImage { height, width, pixels: vec![0.0; height * width] }
    }

    pub fn get(&self, y: usize, x: usize) -> f64 {
        self.pixels[y * self.width + x]
    }

    pub fn set(&mut self, y: usize, x: usize, value: f64) {
        self.pixels[y * self.width + x] = value;
    }
}

/// A batch of equal-height images, `[batch, height, width]`.
///
/// Narrower lines are right-padded with background (0.0) up to the widest
/// line in the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    pub batch: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl ImageBatch {
    pub fn stack(images: &[&LineImage]) -> TrainResult<ImageBatch> {
        let height = images.first().map(|img| img.height).unwrap_or(0);
        if let Some(bad) = images.iter().find(|img| img.height != height) {
            return Err(TrainError::shape(format!(
                "all images in a batch must share height {height}, found {}",
                bad.height
            )));
        }
        let width = images.iter().map(|img| img.width).max().unwrap_or(0);

        let mut data = vec![0.0; images.len() * height * width];
        for (b, img) in images.iter().enumerate() {
            for y in 0..height {
                let dst = (b * height + y) * width;
                data[dst..dst + img.width]
                    .copy_from_slice(&img.pixels[y * img.width..(y + 1) * img.width]);
            }
        }

        Ok(ImageBatch { batch: images.len(), height, width, data })
    }

    pub fn pixel(&self, b: usize, y: usize, x: usize) -> f64 {
        self.data[(b * self.height + y) * self.width + x]
    }

    /// One row per (sample, column): `[batch * width, height]`.
    ///
    /// Row `b * width + x` is the pixel column `x` of sample `b`, which is
    /// the per-time-step feature vector the recognition models consume.
    pub fn columns(&self) -> Matrix {
        let mut out = Matrix::zeros(self.batch * self.width, self.height);
        for b in 0..self.batch {
            for x in 0..self.width {
                let row = out.row_mut(b * self.width + x);
                for (y, v) in row.iter_mut().enumerate() {
                    *v = self.data[(b * self.height + y) * self.width + x];
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_pads_narrow_lines() {
        let a = LineImage::new(2, 3, vec![1.0; 6]).unwrap();
        let b = LineImage::new(2, 1, vec![0.5, 0.25]).unwrap();
        let batch = ImageBatch::stack(&[&a, &b]).unwrap();
        assert_eq!((batch.batch, batch.height, batch.width), (2, 2, 3));
        assert_eq!(batch.pixel(1, 1, 0), 0.25);
        assert_eq!(batch.pixel(1, 1, 2), 0.0);
    }

    #[test]
    fn stack_rejects_mixed_heights() {
        let a = LineImage::blank(2, 3);
        let b = LineImage::blank(3, 3);
        assert!(ImageBatch::stack(&[&a, &b]).is_err());
    }

    #[test]
    fn columns_are_time_steps() {
        let mut img = LineImage::blank(2, 2);
        img.set(1, 0, 0.7);
        let batch = ImageBatch::stack(&[&img]).unwrap();
        let cols = batch.columns();
        assert_eq!((cols.rows, cols.cols), (2, 2));
        assert_eq!(cols.row(0), &[0.0, 0.7]);
    }
}

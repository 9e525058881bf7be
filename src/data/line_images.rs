use std::fs;
use std::path::Path;

use image::imageops::FilterType;
use tracing::debug;

use crate::data::batch::Sample;
use crate::data::raster::LineImage;
use crate::error::{TrainError, TrainResult};

/// Loads a labelled line-image dataset.
///
/// `labels_file` holds one `relative/path.png<TAB>label` pair per line;
/// paths are resolved against `root`. Blank lines are skipped. Every image
/// is converted to grayscale, resized to `height` pixels with its aspect
/// ratio preserved, scaled to [0, 1] and inverted so that dark ink on a light
/// background becomes high intensity.
pub fn load_line_dataset(root: &Path, labels_file: &Path, height: usize) -> TrainResult<Vec<Sample>> {
    if height == 0 {
        return Err(TrainError::InvalidConfig("image height must be at least 1".into()));
    }
    let listing = fs::read_to_string(labels_file)?;
    let mut samples = Vec::new();

    for (line_no, line) in listing.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        let (rel_path, label) = line.split_once('\t').ok_or_else(|| {
            TrainError::InvalidConfig(format!(
                "{}:{}: expected '<path>\\t<label>'",
                labels_file.display(),
                line_no + 1
            ))
        })?;
        let image = load_line_image(&root.join(rel_path), height)?;
        samples.push(Sample { image, label: label.to_string() });
    }

    debug!(count = samples.len(), file = %labels_file.display(), "loaded line images");
    Ok(samples)
}

/// Reads one image file into a `LineImage` of the given height.
pub fn load_line_image(path: &Path, height: usize) -> TrainResult<LineImage> {
    let gray = image::open(path)?.to_luma8();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(TrainError::shape(format!("{} is empty", path.display())));
    }
    let width = ((w as f64 * height as f64 / h as f64).round() as u32).max(1);
    let resized = image::imageops::resize(&gray, width, height as u32, FilterType::Triangle);

    let pixels = resized
        .pixels()
        .map(|p| 1.0 - p.0[0] as f64 / 255.0)
        .collect();
    LineImage::new(height, width as usize, pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn loads_and_normalises_listed_images() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = GrayImage::from_pixel(8, 4, Luma([255u8]));
        img.put_pixel(0, 0, Luma([0u8]));
        img.save(dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join("labels.txt"), "a.png\tab1\n\n").unwrap();

        let samples = load_line_dataset(dir.path(), &dir.path().join("labels.txt"), 4).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].label, "ab1");
        assert_eq!((samples[0].image.height, samples[0].image.width), (4, 8));
        assert!(samples[0].image.get(3, 7) < 1e-9);
    }

    #[test]
    fn malformed_listing_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("labels.txt"), "no-tab-here\n").unwrap();
        let err = load_line_dataset(dir.path(), &dir.path().join("labels.txt"), 4).unwrap_err();
        assert!(matches!(err, TrainError::InvalidConfig(_)));
    }
}

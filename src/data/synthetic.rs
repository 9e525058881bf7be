use rand::Rng;

use crate::data::batch::Sample;
use crate::data::raster::LineImage;
use crate::error::{TrainError, TrainResult};

/// Renders toy text lines from a character set.
///
/// Character `k` of the charset becomes a block of `glyph_width` identical
/// columns whose pixels spell `k + 1` in binary, top row = lowest bit. One
/// background column separates neighbouring glyphs, so repeated characters
/// stay distinguishable for CTC decoding.
#[derive(Debug, Clone)]
pub struct SyntheticLines {
    charset: Vec<char>,
    height: usize,
    glyph_width: usize,
    noise: f64,
}

impl SyntheticLines {
    pub fn new(charset: &str, height: usize, glyph_width: usize, noise: f64) -> TrainResult<Self> {
        let charset: Vec<char> = charset.chars().collect();
        if charset.is_empty() {
            return Err(TrainError::InvalidConfig("synthetic charset is empty".into()));
        }
        let bits_needed = usize::BITS as usize - charset.len().leading_zeros() as usize;
        if height < bits_needed {
            return Err(TrainError::InvalidConfig(format!(
                "height {height} cannot encode {} glyphs (needs {bits_needed} rows)",
                charset.len()
            )));
        }
        if glyph_width == 0 {
            return Err(TrainError::InvalidConfig("glyph_width must be at least 1".into()));
        }
        Ok(SyntheticLines { charset, height, glyph_width, noise })
    }

    pub fn render<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> TrainResult<LineImage> {
        let glyphs = text
            .chars()
            .map(|c| {
                self.charset
                    .iter()
                    .position(|&k| k == c)
                    .ok_or_else(|| TrainError::Codec(format!("'{c}' is not in the synthetic charset")))
            })
            .collect::<TrainResult<Vec<usize>>>()?;

        let width = (glyphs.len() * (self.glyph_width + 1)).max(1);
        let mut image = LineImage::blank(self.height, width);
        for (i, &k) in glyphs.iter().enumerate() {
            let code = k + 1;
            let x0 = i * (self.glyph_width + 1);
            for y in 0..self.height {
                if (code >> y) & 1 == 1 {
                    for x in x0..x0 + self.glyph_width {
                        image.set(y, x, 1.0);
                    }
                }
            }
        }

        if self.noise > 0.0 {
            for p in image.pixels.iter_mut() {
                *p = (*p + rng.gen_range(-self.noise..self.noise)).clamp(0.0, 1.0);
            }
        }
        Ok(image)
    }

    pub fn random_text<R: Rng + ?Sized>(&self, min_len: usize, max_len: usize, rng: &mut R) -> String {
        let len = rng.gen_range(min_len..=max_len.max(min_len));
        (0..len)
            .map(|_| self.charset[rng.gen_range(0..self.charset.len())])
            .collect()
    }

    pub fn generate<R: Rng + ?Sized>(
        &self,
        count: usize,
        min_len: usize,
        max_len: usize,
        rng: &mut R,
    ) -> TrainResult<Vec<Sample>> {
        (0..count)
            .map(|_| {
                let label = self.random_text(min_len, max_len, rng);
                let image = self.render(&label, rng)?;
                Ok(Sample { image, label })
            })
            .collect()
    }
}

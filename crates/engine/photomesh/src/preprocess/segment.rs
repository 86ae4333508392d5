//! Foreground segmentation sessions

use super::PreprocessError;
use image::{GrayImage, Luma, RgbImage};

/// Produces a foreground alpha mask for an RGB image
///
/// The mask must have the same dimensions as the input; 255 is fully
/// foreground, 0 fully background. Sessions are created once at startup and
/// shared across requests.
pub trait Segmenter: Send + Sync {
    fn name(&self) -> &str;

    fn segment(&self, image: &RgbImage) -> Result<GrayImage, PreprocessError>;
}

/// Separates the subject from a roughly uniform backdrop
///
/// The backdrop colour is estimated from the image border. Pixels are
/// assigned a soft alpha from their per-channel distance to that colour,
/// ramping from transparent at `low` to opaque at `high`.
#[derive(Debug, Clone, PartialEq)]
pub struct BorderSegmenter {
    pub low: f32,
    pub high: f32,
}

impl Default for BorderSegmenter {
    fn default() -> Self {
        Self {
            low: 0.06,
            high: 0.18,
        }
    }
}

impl BorderSegmenter {
    fn backdrop(image: &RgbImage) -> [f32; 3] {
        let (w, h) = image.dimensions();
        let mut sum = [0.0f64; 3];
        let mut count = 0u64;
        for (x, y, pixel) in image.enumerate_pixels() {
            if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
                for c in 0..3 {
                    sum[c] += pixel[c] as f64;
                }
                count += 1;
            }
        }
        let count = count.max(1) as f64;
        sum.map(|s| (s / count / 255.0) as f32)
    }
}

impl Segmenter for BorderSegmenter {
    fn name(&self) -> &str {
        "border"
    }

    fn segment(&self, image: &RgbImage) -> Result<GrayImage, PreprocessError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessError::Segmentation("empty image".into()));
        }
        let backdrop = Self::backdrop(image);
        let span = (self.high - self.low).max(f32::EPSILON);

        let mask = GrayImage::from_fn(image.width(), image.height(), |x, y| {
            let pixel = image.get_pixel(x, y);
            let distance = (0..3)
                .map(|c| (pixel[c] as f32 / 255.0 - backdrop[c]).abs())
                .fold(0.0f32, f32::max);
            let t = ((distance - self.low) / span).clamp(0.0, 1.0);
            let alpha = t * t * (3.0 - 2.0 * t);
            Luma([(alpha * 255.0).round() as u8])
        });
        Ok(mask)
    }
}

//! Foreground normalization
//!
//! Reconstruction expects one centered subject on a flat mid-gray backdrop.
//! Photos that already satisfy that (`background_removed`) only lose their
//! alpha channel. Everything else is segmented, cropped to the subject,
//! padded so the subject covers `foreground_ratio` of a square canvas and
//! composited over gray.

pub mod segment;

pub use segment::{BorderSegmenter, Segmenter};

use image::{imageops, DynamicImage, GrayImage, Rgb, RgbImage, Rgba, RgbaImage};
use thiserror::Error;

/// Channel value a fully transparent pixel composites to
pub const GRAY_FILL_U8: u8 = 127;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("no foreground found")]
    NoForeground,

    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    #[error("Mask is {mask:?} but image is {image:?}")]
    MaskSize { mask: (u32, u32), image: (u32, u32) },
}

/// Normalize `image` into the form the model is trained on
pub fn prepare(
    image: &DynamicImage,
    background_removed: bool,
    foreground_ratio: f64,
    segmenter: &dyn Segmenter,
) -> Result<RgbImage, PreprocessError> {
    if background_removed {
        return Ok(image.to_rgb8());
    }

    let cutout = remove_background(image, segmenter)?;
    let framed = resize_foreground(&cutout, foreground_ratio)?;
    tracing::debug!(
        segmenter = segmenter.name(),
        side = framed.width(),
        "normalized foreground"
    );
    Ok(composite_over_gray(&framed))
}

/// Whether the image carries an alpha channel with at least one non-opaque pixel
pub fn has_transparency(image: &DynamicImage) -> bool {
    image.color().has_alpha() && image.to_rgba8().pixels().any(|p| p[3] < u8::MAX)
}

/// RGBA cutout of the subject
///
/// Existing transparency is trusted as-is; otherwise the segmenter supplies
/// the alpha channel.
pub fn remove_background(
    image: &DynamicImage,
    segmenter: &dyn Segmenter,
) -> Result<RgbaImage, PreprocessError> {
    if has_transparency(image) {
        return Ok(image.to_rgba8());
    }

    let rgb = image.to_rgb8();
    let mask = segmenter.segment(&rgb)?;
    apply_mask(&rgb, &mask)
}

fn apply_mask(rgb: &RgbImage, mask: &GrayImage) -> Result<RgbaImage, PreprocessError> {
    if mask.dimensions() != rgb.dimensions() {
        return Err(PreprocessError::MaskSize {
            mask: mask.dimensions(),
            image: rgb.dimensions(),
        });
    }
    Ok(RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    }))
}

/// Inclusive bounding box `(x0, y0, x1, y1)` of pixels with alpha > 0
fn foreground_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    image
        .enumerate_pixels()
        .filter(|(_, _, p)| p[3] > 0)
        .fold(None, |bounds, (x, y, _)| match bounds {
            None => Some((x, y, x, y)),
            Some((x0, y0, x1, y1)) => Some((x0.min(x), y0.min(y), x1.max(x), y1.max(y))),
        })
}

/// Crop to the subject and pad so it fills `ratio` of a square canvas
pub fn resize_foreground(image: &RgbaImage, ratio: f64) -> Result<RgbaImage, PreprocessError> {
    let (x0, y0, x1, y1) = foreground_bounds(image).ok_or(PreprocessError::NoForeground)?;
    let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);
    let subject = imageops::crop_imm(image, x0, y0, w, h).to_image();

    let side = w.max(h);
    let mut square = RgbaImage::new(side, side);
    imageops::replace(
        &mut square,
        &subject,
        ((side - w) / 2) as i64,
        ((side - h) / 2) as i64,
    );

    let canvas_side = ((side as f64 / ratio).floor() as u32).max(side);
    let mut canvas = RgbaImage::new(canvas_side, canvas_side);
    let offset = ((canvas_side - side) / 2) as i64;
    imageops::replace(&mut canvas, &square, offset, offset);
    Ok(canvas)
}

/// Flatten onto mid-gray: `color * alpha + 0.5 * (1 - alpha)` on `[0, 1]`
/// floats, scaled back by 255 and truncated
pub fn composite_over_gray(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| -> u8 {
            let value = (c as f32 / 255.0) * alpha + 0.5 * (1.0 - alpha);
            (value * 255.0) as u8
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

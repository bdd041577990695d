use anyhow::Result;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbImage};
use std::path::Path;
use tracing::{debug, warn};

use crate::error::PipelineError;

/// Image resized for recognition plus the factor that produced it.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: RgbImage,
    /// `new_width / old_width`; 1.0 when no resize happened.
    pub scale: f32,
}

impl NormalizedImage {
    pub fn inverse_scale(&self) -> f32 {
        if self.scale > 0.0 { 1.0 / self.scale } else { 1.0 }
    }
}

/// Downsamples `image` so its width is at most `max_width`, keeping the aspect
/// ratio. Uses area averaging so thin strokes survive the resize.
pub fn normalize_scale(image: &RgbImage, max_width: u32) -> NormalizedImage {
    let (width, height) = image.dimensions();
    if width <= max_width || max_width == 0 {
        return NormalizedImage {
            image: image.clone(),
            scale: 1.0,
        };
    }

    let new_width = max_width;
    let new_height = ((height as u64 * max_width as u64 / width as u64) as u32).max(1);
    let scale = new_width as f32 / width as f32;
    let resized = image::imageops::thumbnail(image, new_width, new_height);
    debug!(
        "normalized {}x{} -> {}x{} (scale {:.3})",
        width, height, new_width, new_height, scale
    );
    NormalizedImage {
        image: resized,
        scale,
    }
}

/// Decodes an image file with its EXIF orientation applied, falling back to a
/// plain decode when the oriented path fails.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    match load_oriented(path) {
        Ok(image) => Ok(image),
        Err(err) => {
            warn!(
                "oriented decode failed for {} ({}); retrying without EXIF",
                path.display(),
                err
            );
            image::open(path).map_err(|fallback| {
                PipelineError::ImageDecode {
                    path: path.to_path_buf(),
                    reason: fallback.to_string(),
                }
                .into()
            })
        }
    }
}

fn load_oriented(path: &Path) -> image::ImageResult<DynamicImage> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// Converts to 8-bit RGB, compositing any alpha channel over white.
pub fn to_rgb_flattened(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_image_is_untouched() {
        let image = RgbImage::new(800, 600);
        let normalized = normalize_scale(&image, 2000);
        assert_eq!(normalized.scale, 1.0);
        assert_eq!(normalized.image.dimensions(), (800, 600));
        assert_eq!(normalized.inverse_scale(), 1.0);
    }

    #[test]
    fn wide_image_is_resized_to_threshold() {
        let image = RgbImage::from_pixel(4000, 1000, image::Rgb([200, 200, 200]));
        let normalized = normalize_scale(&image, 2000);
        assert_eq!(normalized.image.dimensions(), (2000, 500));
        assert!((normalized.scale - 0.5).abs() < 1e-6);
        assert!((normalized.inverse_scale() - 2.0).abs() < 1e-6);
        assert_eq!(normalized.image.get_pixel(10, 10).0, [200, 200, 200]);
    }

    #[test]
    fn alpha_is_flattened_onto_white() {
        let mut rgba = image::RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        let rgb = to_rgb_flattened(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        let err = load_image(Path::new("/nonexistent/page.png")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::ImageDecode { .. })
        ));
    }
}

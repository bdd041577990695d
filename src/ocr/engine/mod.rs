mod assign;
mod bubbles;
mod cluster;
mod geom;
mod layout;
mod merge;
mod parse;
mod preprocess;
mod tesseract;
mod text;

use anyhow::Result;
use image::RgbImage;

use crate::ocr::{Fragment, TextBlock};

pub use assign::{Assignment, assign_to_bubbles};
pub use bubbles::detect_bubble_candidates;
pub use cluster::cluster_fragments;
pub use layout::{PlacedLine, TextLayout, TextMetrics, layout_text, usable_area};
pub use merge::merge_fragments;
pub use preprocess::{NormalizedImage, load_image, normalize_scale, to_rgb_flattened};
pub use tesseract::{TesseractRecognizer, list_tesseract_languages};

/// Source of raw fragments for a normalized page image.
///
/// Implementations must keep every polygon inside the image bounds. Text may
/// be empty; the merger drops such fragments.
pub trait Recognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<Fragment>>;
}

impl<R: Recognizer + ?Sized> Recognizer for &mut R {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<Fragment>> {
        (**self).recognize(image)
    }
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<Fragment>> {
        (**self).recognize(image)
    }
}

/// Detects bubbles on `image` and merges `fragments` against them.
pub fn merge_by_bubbles(image: &RgbImage, fragments: &[Fragment]) -> Vec<TextBlock> {
    let candidates = detect_bubble_candidates(image);
    merge_fragments(&candidates, fragments)
}

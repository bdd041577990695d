use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{BorderType, find_contours};
use imageproc::contrast::{ThresholdType, otsu_level, threshold};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate_mut, erode_mut, open};
use tracing::debug;

use crate::ocr::{BubbleCandidate, Rect};

const INVERT_BELOW_LIGHT_RATIO: f32 = 0.35;
const CLOSE_KERNEL_RATIO: f32 = 0.01;
const CLOSE_ITERATIONS: usize = 2;
const MIN_AREA_RATIO: f64 = 0.002;
const MAX_AREA_RATIO: f64 = 0.60;
const MAX_ASPECT: f32 = 12.0;
const PAD_RATIO: f32 = 0.005;

/// Proposes bubble rectangles from pixel structure alone. The result is sorted
/// by (top, left), which is the scan order used when assigning fragments.
pub fn detect_bubble_candidates(image: &RgbImage) -> Vec<BubbleCandidate> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Vec::new();
    }
    let short_side = width.min(height);

    let gray = image::imageops::grayscale(image);
    let mut binary = threshold(&gray, otsu_level(&gray), ThresholdType::Binary);
    if light_ratio(&binary) < INVERT_BELOW_LIGHT_RATIO {
        image::imageops::invert(&mut binary);
    }

    let kernel = ((short_side as f32 * CLOSE_KERNEL_RATIO) as u32).max(3);
    let close_radius = kernel_radius(kernel);
    for _ in 0..CLOSE_ITERATIONS {
        dilate_mut(&mut binary, Norm::L2, close_radius);
    }
    for _ in 0..CLOSE_ITERATIONS {
        erode_mut(&mut binary, Norm::L2, close_radius);
    }
    let open_kernel = (kernel / 2).max(3);
    let cleaned = open(&binary, Norm::L2, kernel_radius(open_kernel));

    let total_area = width as f64 * height as f64;
    let min_area = total_area * MIN_AREA_RATIO;
    let max_area = total_area * MAX_AREA_RATIO;
    let pad = (short_side as f32 * PAD_RATIO) as i32;

    let mut rects = Vec::new();
    for (x, y, w, h) in external_bounding_rects(&cleaned) {
        let area = w as f64 * h as f64;
        if area < min_area || area > max_area {
            continue;
        }
        let aspect = w as f32 / h.max(1) as f32;
        if !(1.0 / MAX_ASPECT..=MAX_ASPECT).contains(&aspect) {
            continue;
        }
        rects.push(Rect::new(
            (x - pad).max(0),
            (y - pad).max(0),
            (x + w + pad).min(width as i32 - 1),
            (y + h + pad).min(height as i32 - 1),
        ));
    }
    rects.sort_by_key(|rect| (rect.y1, rect.x1));
    debug!("bubble candidates: {}", rects.len());

    rects
        .into_iter()
        .map(|rect| BubbleCandidate { rect })
        .collect()
}

fn light_ratio(binary: &GrayImage) -> f32 {
    let total = binary.pixels().len().max(1);
    let light = binary.pixels().filter(|pixel| pixel[0] == 255).count();
    light as f32 / total as f32
}

/// Morphology here is distance based, so a `k`-wide elliptical kernel maps to
/// a Euclidean radius of `k / 2`.
fn kernel_radius(kernel: u32) -> u8 {
    (kernel / 2).clamp(1, u8::MAX as u32) as u8
}

/// Bounding rectangles `(x, y, w, h)` of the outermost foreground regions.
fn external_bounding_rects(binary: &GrayImage) -> Vec<(i32, i32, i32, i32)> {
    // Contour tracing only starts an outer border after a background pixel,
    // so regions touching the left edge need a zero frame around the image.
    let (width, height) = binary.dimensions();
    let mut framed = GrayImage::new(width + 2, height + 2);
    for (x, y, pixel) in binary.enumerate_pixels() {
        if pixel[0] > 0 {
            framed.put_pixel(x + 1, y + 1, Luma([255]));
        }
    }

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .filter_map(|contour| {
            let min_x = contour.points.iter().map(|p| p.x).min()?;
            let max_x = contour.points.iter().map(|p| p.x).max()?;
            let min_y = contour.points.iter().map(|p| p.y).min()?;
            let max_y = contour.points.iter().map(|p| p.y).max()?;
            Some((min_x - 1, min_y - 1, max_x - min_x + 1, max_y - min_y + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn panel_with_bubbles(bubbles: &[(u32, u32, u32, u32)]) -> RgbImage {
        let mut image = RgbImage::from_pixel(400, 200, Rgb([0, 0, 0]));
        for &(x, y, w, h) in bubbles {
            for py in y..y + h {
                for px in x..x + w {
                    image.put_pixel(px, py, Rgb([255, 255, 255]));
                }
            }
        }
        image
    }

    #[test]
    fn finds_two_light_bubbles_in_scan_order() {
        let image = panel_with_bubbles(&[(210, 10, 180, 180), (10, 10, 180, 180)]);
        let candidates = detect_bubble_candidates(&image);
        assert_eq!(candidates.len(), 2);
        let first = candidates[0].rect;
        let second = candidates[1].rect;
        assert!(first.x1 <= 10 && first.x2 >= 189);
        assert!(second.x1 <= 210 && second.x2 >= 389);
        assert!(first.x1 < second.x1);
    }

    #[test]
    fn blank_page_yields_no_candidates() {
        let image = RgbImage::from_pixel(300, 300, Rgb([255, 255, 255]));
        assert!(detect_bubble_candidates(&image).is_empty());
    }

    #[test]
    fn slivers_are_rejected() {
        // 390x4 strip: aspect ratio far above 12.
        let image = panel_with_bubbles(&[(5, 150, 390, 4), (10, 10, 380, 85)]);
        let candidates = detect_bubble_candidates(&image);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].rect.y2 < 100);
    }

    #[test]
    fn left_edge_regions_are_detected() {
        let image = panel_with_bubbles(&[(0, 20, 150, 160), (220, 20, 150, 160)]);
        let candidates = detect_bubble_candidates(&image);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].rect.x1, 0);
    }
}

mod cache;
mod debug;
mod engine;
mod font;
mod glyphs;
mod inpaint;
mod render;

use serde::Serialize;

pub use cache::{CacheKey, DEFAULT_RESULT_CACHE_SIZE, OcrPack, ResultCache};
pub use debug::{OcrDebugConfig, build_ocr_debug_config, render_debug_overlay};
pub use engine::{
    Assignment, NormalizedImage, PlacedLine, Recognizer, TesseractRecognizer, TextLayout,
    TextMetrics, assign_to_bubbles, cluster_fragments, detect_bubble_candidates, layout_text,
    list_tesseract_languages, load_image, merge_by_bubbles, merge_fragments, normalize_scale,
    to_rgb_flattened, usable_area,
};
pub use font::{FontMetrics, ResolvedFont, load_font_metrics, resolve_font};
pub use inpaint::{MAX_INPAINT_RADIUS, erase_polygon, polygon_mask};
pub use render::{RenderConfig, Renderer, render_translated_image};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box derived from a polygon. `x2`/`y2` are the max coordinates,
/// not exclusive bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> i64 {
        self.width().max(0) as i64 * self.height().max(0) as i64
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    /// Inclusive containment test with `pad` pixels of tolerance on every side.
    pub fn contains(&self, point: (f32, f32), pad: i32) -> bool {
        let (px, py) = point;
        (self.x1 - pad) as f32 <= px
            && px <= (self.x2 + pad) as f32
            && (self.y1 - pad) as f32 <= py
            && py <= (self.y2 + pad) as f32
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Four corners in top-left, top-right, bottom-right, bottom-left order.
    pub fn to_polygon(&self) -> Polygon {
        Polygon([
            Point::new(self.x1, self.y1),
            Point::new(self.x2, self.y1),
            Point::new(self.x2, self.y2),
            Point::new(self.x1, self.y2),
        ])
    }
}

/// Quadrilateral in image pixel coordinates. This is the only box shape that
/// crosses the pipeline boundary; recognizer output is converted once on
/// ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Polygon(pub [Point; 4]);

impl Polygon {
    pub fn new(points: [Point; 4]) -> Self {
        Self(points)
    }

    /// Converts floating point corners, truncating toward zero.
    pub fn from_f32(points: [(f32, f32); 4]) -> Self {
        Self(points.map(|(x, y)| Point::new(x as i32, y as i32)))
    }

    pub fn points(&self) -> &[Point; 4] {
        &self.0
    }

    pub fn aabb(&self) -> Rect {
        let mut rect = Rect::new(i32::MAX, i32::MAX, i32::MIN, i32::MIN);
        for point in &self.0 {
            rect.x1 = rect.x1.min(point.x);
            rect.y1 = rect.y1.min(point.y);
            rect.x2 = rect.x2.max(point.x);
            rect.y2 = rect.y2.max(point.y);
        }
        rect
    }

    /// Maps the polygon by `factor`, e.g. `OcrPack::inverse_scale` to go back
    /// to full-resolution coordinates.
    pub fn scaled(&self, factor: f32) -> Polygon {
        Polygon(self.0.map(|point| {
            Point::new(
                (point.x as f32 * factor).round() as i32,
                (point.y as f32 * factor).round() as i32,
            )
        }))
    }

    pub fn clamped(&self, width: u32, height: u32) -> Polygon {
        let max_x = width.saturating_sub(1) as i32;
        let max_y = height.saturating_sub(1) as i32;
        Polygon(
            self.0
                .map(|point| Point::new(point.x.clamp(0, max_x), point.y.clamp(0, max_y))),
        )
    }
}

/// One raw recognized span of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    pub text: String,
    pub confidence: f32,
    pub polygon: Polygon,
}

impl Fragment {
    pub fn new(text: impl Into<String>, confidence: f32, polygon: Polygon) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            polygon,
        }
    }
}

/// Rectangular region proposed by pixel analysis alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BubbleCandidate {
    pub rect: Rect,
}

/// Fragments consolidated into one bubble or one fallback cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub confidence: f32,
    pub polygon: Polygon,
}

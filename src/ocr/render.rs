use anyhow::{Context, Result, anyhow};
use image::{Rgb, RgbImage};
use resvg::render;
use std::path::PathBuf;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{debug, warn};
use usvg::{Options, Tree, fontdb};

use super::engine::{TextLayout, layout_text, usable_area};
use super::font::{ResolvedFont, resolve_font};
use super::{Polygon, glyphs, inpaint};
use crate::error::PipelineError;

/// Immutable settings for one render session.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub inpaint_radius: u32,
    /// Fraction of the box width removed on each side.
    pub margin_horizontal: f32,
    /// Fraction of the box height removed on each side.
    pub margin_vertical: f32,
    pub font_path: Option<PathBuf>,
    pub font_color: [u8; 3],
    pub min_font_size: u32,
    pub max_font_size: u32,
    pub line_spacing: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            inpaint_radius: 15,
            margin_horizontal: 0.10,
            margin_vertical: 0.10,
            font_path: None,
            font_color: [0, 0, 0],
            min_font_size: 8,
            max_font_size: 100,
            line_spacing: 1.2,
        }
    }
}

/// Erases source text and draws translations. The font chain is resolved once
/// at construction and reused for every block.
pub struct Renderer {
    config: RenderConfig,
    font: ResolvedFont,
    fontdb: Arc<fontdb::Database>,
}

impl Renderer {
    pub fn new(config: RenderConfig) -> Self {
        let font = resolve_font(config.font_path.as_deref());
        Self::with_font(config, font)
    }

    pub fn with_font(config: RenderConfig, font: ResolvedFont) -> Self {
        let mut db = fontdb::Database::new();
        if let ResolvedFont::Vector(metrics) = &font {
            db.load_font_data(metrics.data().to_vec());
        }
        debug!("renderer font: {}", font.describe());
        Self {
            config,
            font,
            fontdb: Arc::new(db),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn font(&self) -> &ResolvedFont {
        &self.font
    }

    /// Font-fit layout for `text` inside `polygon`'s bounding box.
    pub fn layout(&self, text: &str, polygon: &Polygon) -> Option<TextLayout> {
        layout_text(text, &polygon.aabb(), &self.config, &self.font)
    }

    /// Returns a copy of `image` with every polygon erased and its text drawn.
    ///
    /// `polygons` and `texts` must have the same length; a mismatch is an
    /// error and nothing is drawn. Blocks with blank text or no usable area
    /// after margins are erased but left empty.
    pub fn render(&self, image: &RgbImage, polygons: &[Polygon], texts: &[String]) -> Result<RgbImage> {
        if polygons.len() != texts.len() {
            return Err(PipelineError::CountMismatch {
                polygons: polygons.len(),
                texts: texts.len(),
            }
            .into());
        }

        let mut output = image.clone();
        for polygon in polygons {
            inpaint::erase_polygon(&mut output, polygon, self.config.inpaint_radius);
        }

        let mut layouts = Vec::with_capacity(texts.len());
        for (idx, (polygon, text)) in polygons.iter().zip(texts).enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            match self.layout(text, polygon) {
                Some(layout) => {
                    if !layout.fits {
                        debug!(
                            "block {} overflows at minimum size {}",
                            idx, layout.font_size
                        );
                    }
                    layouts.push(layout);
                }
                None => {
                    let (_, _, w, h) = usable_area(&polygon.aabb(), &self.config);
                    warn!("skipping block {}: usable area {}x{} after margins", idx, w, h);
                }
            }
        }

        match &self.font {
            ResolvedFont::BuiltIn => {
                let color = Rgb(self.config.font_color);
                for layout in &layouts {
                    for line in &layout.lines {
                        glyphs::draw_text(&mut output, &line.text, line.x, line.y, layout.font_size, color);
                    }
                }
            }
            ResolvedFont::Vector(metrics) => {
                if layouts.is_empty() {
                    return Ok(output);
                }
                let family = metrics.family().unwrap_or("sans-serif");
                let svg = text_overlay_svg(
                    output.width(),
                    output.height(),
                    &layouts,
                    family,
                    self.config.font_color,
                    |size| metrics.ascent_px(size),
                );
                let overlay = rasterize_svg(&svg, self.fontdb.clone())?;
                composite_over(&mut output, &overlay);
            }
        }
        Ok(output)
    }
}

/// One-shot convenience around [`Renderer`].
pub fn render_translated_image(
    image: &RgbImage,
    polygons: &[Polygon],
    texts: &[String],
    config: &RenderConfig,
) -> Result<RgbImage> {
    Renderer::new(config.clone()).render(image, polygons, texts)
}

fn text_overlay_svg<F: Fn(u32) -> f32>(
    width: u32,
    height: u32,
    layouts: &[TextLayout],
    family: &str,
    color: [u8; 3],
    ascent: F,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    let fill = format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2]);
    for layout in layouts {
        let baseline = ascent(layout.font_size);
        for line in &layout.lines {
            svg.push_str(&format!(
                r#"<text x="{x:.2}" y="{y:.2}" font-family="{family}" font-size="{size}" fill="{fill}" xml:space="preserve">{text}</text>"#,
                x = line.x,
                y = line.y + baseline,
                family = escape_xml(family),
                size = layout.font_size,
                fill = fill,
                text = escape_xml(&line.text)
            ));
        }
    }
    svg.push_str("</svg>");
    svg
}

pub(crate) fn rasterize_svg(svg: &str, fontdb: Arc<fontdb::Database>) -> Result<Pixmap> {
    let options = Options {
        fontdb,
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    Ok(pixmap)
}

/// Source-over blend of a premultiplied RGBA pixmap onto `image`.
pub(crate) fn composite_over(image: &mut RgbImage, overlay: &Pixmap) {
    let width = image.width().min(overlay.width());
    let height = image.height().min(overlay.height());
    let stride = overlay.width() as usize;
    let data = overlay.data();
    for y in 0..height {
        for x in 0..width {
            let offset = (y as usize * stride + x as usize) * 4;
            let alpha = data[offset + 3];
            if alpha == 0 {
                continue;
            }
            let keep = 1.0 - alpha as f32 / 255.0;
            let pixel = image.get_pixel_mut(x, y);
            for channel in 0..3 {
                let src = data[offset + channel] as f32;
                let dst = pixel.0[channel] as f32;
                pixel.0[channel] = (src + dst * keep).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::Rect;

    fn bitmap_renderer() -> Renderer {
        Renderer::with_font(RenderConfig::default(), ResolvedFont::BuiltIn)
    }

    fn white(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([255, 255, 255]))
    }

    fn dark_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0[0] < 128).count()
    }

    #[test]
    fn count_mismatch_is_an_error() {
        let polygons = [
            Rect::new(0, 0, 10, 10).to_polygon(),
            Rect::new(20, 0, 30, 10).to_polygon(),
            Rect::new(40, 0, 50, 10).to_polygon(),
        ];
        let texts = vec!["a".to_string(), "b".to_string()];
        let err = bitmap_renderer()
            .render(&white(60, 20), &polygons, &texts)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::CountMismatch { polygons: 3, texts: 2 })
        ));
    }

    #[test]
    fn overlong_text_still_renders_at_minimum_size() {
        let renderer = bitmap_renderer();
        // 250x74 box: 200x60 usable.
        let polygon = Rect::new(10, 10, 260, 84).to_polygon();
        let text = vec!["overflowing"; 80].join(" ");
        let layout = renderer.layout(&text, &polygon).expect("layout");
        assert_eq!(layout.font_size, 8);
        assert!(!layout.fits);

        let output = renderer
            .render(&white(300, 120), &[polygon], &[text])
            .expect("render");
        assert!(dark_pixels(&output) > 0);
    }

    #[test]
    fn text_is_drawn_inside_its_box() {
        let renderer = bitmap_renderer();
        let polygon = Rect::new(20, 20, 180, 80).to_polygon();
        let output = renderer
            .render(&white(200, 100), &[polygon], &["Hello world".to_string()])
            .expect("render");
        let (mut min_x, mut max_x) = (u32::MAX, 0);
        for (x, _, pixel) in output.enumerate_pixels() {
            if pixel.0[0] < 128 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
        assert!(min_x >= 20 && max_x <= 180);
    }

    #[test]
    fn degenerate_block_is_erased_but_skipped() {
        let mut image = white(100, 100);
        for x in 40..60 {
            image.put_pixel(x, 50, Rgb([0, 0, 0]));
        }
        let polygon = Rect::new(40, 50, 59, 50).to_polygon();
        let output = bitmap_renderer()
            .render(&image, &[polygon], &["ignored".to_string()])
            .expect("render");
        assert_eq!(dark_pixels(&output), 0);
    }

    #[test]
    fn overlay_svg_escapes_text() {
        let layout = TextLayout {
            font_size: 12,
            line_height: 14.0,
            lines: vec![crate::ocr::PlacedLine {
                text: "Tom & \"Jerry\"".to_string(),
                x: 1.0,
                y: 2.0,
                width: 50.0,
            }],
            fits: true,
        };
        let svg = text_overlay_svg(10, 10, &[layout], "Test Sans", [255, 0, 0], |_| 10.0);
        assert!(svg.contains("Tom &amp; &quot;Jerry&quot;"));
        assert!(svg.contains(r##"fill="#ff0000""##));
        assert!(svg.contains(r#"y="12.00""#));
    }
}

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::RgbImage;
use serde::Serialize;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use usvg::fontdb;

use super::render::rasterize_svg;
use super::{BubbleCandidate, Rect, TextBlock};

const CANDIDATE_STROKE: &str = "#2962ff";
const BLOCK_STROKE: &str = "#00c853";

#[derive(Debug, Clone)]
pub struct OcrDebugConfig {
    output_dir: PathBuf,
    base_name: String,
}

impl OcrDebugConfig {
    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_ocr_bbox.png", self.base_name))
    }

    pub fn json_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_ocr.json", self.base_name))
    }
}

pub fn build_ocr_debug_config(output_dir: &Path, src_path: &Path) -> Result<OcrDebugConfig> {
    let base = src_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("input");
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create debug dir: {}", output_dir.display()))?;
    Ok(OcrDebugConfig {
        output_dir: output_dir.to_path_buf(),
        base_name: sanitize_filename_component(base),
    })
}

#[derive(Serialize)]
struct DebugDump<'a> {
    width: u32,
    height: u32,
    candidates: &'a [BubbleCandidate],
    blocks: &'a [TextBlock],
}

/// Writes the normalized page with candidates (blue) and merged blocks
/// (green) outlined, plus the blocks as JSON. Returns both paths.
pub fn render_debug_overlay(
    config: &OcrDebugConfig,
    image: &RgbImage,
    candidates: &[BubbleCandidate],
    blocks: &[TextBlock],
) -> Result<(PathBuf, PathBuf)> {
    let svg = render_bbox_svg(image, candidates, blocks)?;
    let pixmap = rasterize_svg(&svg, Arc::new(fontdb::Database::new()))?;
    let overlay = image::RgbaImage::from_raw(pixmap.width(), pixmap.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    let png_path = config.output_path();
    overlay
        .save(&png_path)
        .with_context(|| format!("failed to write {}", png_path.display()))?;

    let dump = DebugDump {
        width: image.width(),
        height: image.height(),
        candidates,
        blocks,
    };
    let json_path = config.json_path();
    let json = serde_json::to_string_pretty(&dump)?;
    std::fs::write(&json_path, json)
        .with_context(|| format!("failed to write {}", json_path.display()))?;

    info!("ocr debug written: {}", png_path.display());
    Ok((png_path, json_path))
}

fn render_bbox_svg(
    image: &RgbImage,
    candidates: &[BubbleCandidate],
    blocks: &[TextBlock],
) -> Result<String> {
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .with_context(|| "failed to encode debug image")?;
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));
    let (width, height) = image.dimensions();

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));
    for candidate in candidates {
        svg.push_str(&outline(&candidate.rect, CANDIDATE_STROKE));
    }
    for block in blocks {
        svg.push_str(&outline(&block.polygon.aabb(), BLOCK_STROKE));
    }
    svg.push_str("</svg>");
    Ok(svg)
}

fn outline(rect: &Rect, stroke: &str) -> String {
    format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{stroke}" stroke-width="2"/>"#,
        x = rect.x1,
        y = rect.y1,
        w = rect.width().max(1),
        h = rect.height().max(1),
        stroke = stroke
    )
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() {
        "input".to_string()
    } else {
        out
    }
}

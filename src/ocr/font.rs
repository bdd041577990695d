use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use super::engine::TextMetrics;
use super::glyphs;

/// Font file bundled with most Linux desktops and commonly installed elsewhere.
const BUNDLED_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    ascender: i16,
    descender: i16,
    family: Option<String>,
    face_index: u32,
}

impl std::fmt::Debug for FontMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontMetrics")
            .field("family", &self.family)
            .field("units_per_em", &self.units_per_em)
            .field("face_index", &self.face_index)
            .finish()
    }
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn scale(&self, size: u32) -> f32 {
        size as f32 / self.units_per_em.max(1) as f32
    }

    pub fn ascent_px(&self, size: u32) -> f32 {
        self.ascender as f32 * self.scale(size)
    }

    pub fn text_width_px(&self, text: &str, size: u32) -> f32 {
        let Ok(face) = Face::parse(&self.data, self.face_index) else {
            return estimate_text_width_units(text) * size as f32;
        };
        let mut advance = 0u32;
        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            if ch == ' ' {
                advance = advance.saturating_add(self.space_advance as u32);
                continue;
            }
            let glyph_advance = face
                .glyph_index(ch)
                .and_then(|glyph| face.glyph_hor_advance(glyph))
                .unwrap_or(self.space_advance);
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f32 * self.scale(size)
    }
}

/// The font a renderer draws with after walking the fallback chain.
#[derive(Debug, Clone)]
pub enum ResolvedFont {
    Vector(FontMetrics),
    /// Built-in 5x7 bitmap glyphs; ASCII only.
    BuiltIn,
}

impl ResolvedFont {
    pub fn describe(&self) -> String {
        match self {
            ResolvedFont::Vector(metrics) => metrics.family().unwrap_or("unnamed font").to_string(),
            ResolvedFont::BuiltIn => "built-in bitmap font".to_string(),
        }
    }
}

impl TextMetrics for ResolvedFont {
    fn text_width(&self, text: &str, size: u32) -> f32 {
        match self {
            ResolvedFont::Vector(metrics) => metrics.text_width_px(text, size),
            ResolvedFont::BuiltIn => glyphs::text_width(text, size),
        }
    }

    fn line_height(&self, size: u32) -> f32 {
        match self {
            ResolvedFont::Vector(metrics) => {
                (metrics.ascender as f32 - metrics.descender as f32) * metrics.scale(size)
            }
            ResolvedFont::BuiltIn => glyphs::line_height(size),
        }
    }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Walks the font chain: explicit file, platform default family, bundled
/// default, then the built-in bitmap font. Never fails.
pub fn resolve_font(font_path: Option<&Path>) -> ResolvedFont {
    if let Some(path) = font_path {
        match load_font_metrics(path) {
            Ok(metrics) => return ResolvedFont::Vector(metrics),
            Err(err) => warn!("font {} unusable, falling back: {:#}", path.display(), err),
        }
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    for family in platform_default_families() {
        if let Ok(metrics) = load_font_metrics_from_family(&db, family) {
            debug!("using platform font {}", family);
            return ResolvedFont::Vector(metrics);
        }
    }

    for path in BUNDLED_FONT_PATHS.iter().map(PathBuf::from) {
        if let Ok(metrics) = load_font_metrics(&path) {
            debug!("using bundled font {}", path.display());
            return ResolvedFont::Vector(metrics);
        }
    }
    if let Ok(metrics) = load_font_metrics_from_family(&db, "sans-serif") {
        return ResolvedFont::Vector(metrics);
    }

    warn!("no vector font available; using the built-in bitmap font");
    ResolvedFont::BuiltIn
}

fn platform_default_families() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["Arial", "Segoe UI"]
    } else if cfg!(target_os = "macos") {
        &["Helvetica", "Arial"]
    } else {
        &["DejaVu Sans", "Liberation Sans"]
    }
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn load_font_metrics_from_data(data: &[u8], preferred_family: Option<&str>) -> Result<FontMetrics> {
    let mut fallback = None;
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let metrics = FontMetrics {
            data: Arc::new(data.to_vec()),
            units_per_em,
            space_advance,
            ascender: face.ascender(),
            descender: face.descender(),
            family: family.clone(),
            face_index: index,
        };
        if let (Some(preferred), Some(found)) = (preferred_family, &family)
            && found.eq_ignore_ascii_case(preferred)
        {
            return Ok(metrics);
        }
        if fallback.is_none() {
            fallback = Some(metrics);
        }
    }
    fallback.ok_or_else(|| anyhow!("failed to parse font data"))
}

fn load_font_metrics_from_family(db: &fontdb::Database, family: &str) -> Result<FontMetrics> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    load_font_metrics_from_data(&data, Some(family))
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

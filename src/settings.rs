use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ocr::{MAX_INPAINT_RADIUS, RenderConfig};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub ocr_max_width: u32,
    pub ocr_languages: String,
    pub ocr_psm: u32,
    pub ocr_cache_size: usize,
    pub inpaint_radius: u32,
    pub margin_horizontal: f32,
    pub margin_vertical: f32,
    pub font_path: Option<PathBuf>,
    pub font_color: [u8; 3],
    pub min_font_size: u32,
    pub max_font_size: u32,
    pub line_spacing: f32,
    pub full_resolution: bool,
    pub source_lang: String,
    pub target_lang: String,
    pub translate_cache_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let render = RenderConfig::default();
        Self {
            ocr_max_width: 2000,
            ocr_languages: "eng".to_string(),
            ocr_psm: 11,
            ocr_cache_size: 10,
            inpaint_radius: render.inpaint_radius,
            margin_horizontal: render.margin_horizontal,
            margin_vertical: render.margin_vertical,
            font_path: render.font_path,
            font_color: render.font_color,
            min_font_size: render.min_font_size,
            max_font_size: render.max_font_size,
            line_spacing: render.line_spacing,
            full_resolution: false,
            source_lang: "EN".to_string(),
            target_lang: "FR".to_string(),
            translate_cache_size: 1000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    render: Option<RenderSettings>,
    translate: Option<TranslateSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    max_width: Option<u32>,
    languages: Option<String>,
    psm: Option<u32>,
    cache_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    inpaint_radius: Option<u32>,
    margin_horizontal: Option<f32>,
    margin_vertical: Option<f32>,
    font_path: Option<String>,
    font_color: Option<String>,
    min_font_size: Option<u32>,
    max_font_size: Option<u32>,
    line_spacing: Option<f32>,
    full_resolution: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateSettings {
    source_lang: Option<String>,
    target_lang: Option<String>,
    cache_size: Option<usize>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings
                .merge(parsed)
                .with_context(|| format!("invalid settings: {}", path.display()))?;
        }
    }

    Ok(settings)
}

impl Settings {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            inpaint_radius: self.inpaint_radius,
            margin_horizontal: self.margin_horizontal,
            margin_vertical: self.margin_vertical,
            font_path: self.font_path.clone(),
            font_color: self.font_color,
            min_font_size: self.min_font_size,
            max_font_size: self.max_font_size,
            line_spacing: self.line_spacing,
        }
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(ocr) = incoming.ocr {
            if let Some(width) = ocr.max_width
                && width > 0
            {
                self.ocr_max_width = width;
            }
            if let Some(languages) = ocr.languages
                && !languages.trim().is_empty()
            {
                self.ocr_languages = languages.trim().to_string();
            }
            if let Some(psm) = ocr.psm {
                self.ocr_psm = psm;
            }
            if let Some(size) = ocr.cache_size {
                self.ocr_cache_size = size;
            }
        }
        if let Some(render) = incoming.render {
            if let Some(radius) = render.inpaint_radius {
                self.inpaint_radius = check_inpaint_radius(radius)?;
            }
            if let Some(margin) = render.margin_horizontal {
                self.margin_horizontal = check_margin("margin_horizontal", margin)?;
            }
            if let Some(margin) = render.margin_vertical {
                self.margin_vertical = check_margin("margin_vertical", margin)?;
            }
            if let Some(path) = render.font_path
                && !path.trim().is_empty()
            {
                self.font_path = Some(PathBuf::from(path.trim()));
            }
            if let Some(color) = render.font_color
                && !color.trim().is_empty()
            {
                self.font_color = parse_hex_color(&color)?;
            }
            if let Some(size) = render.min_font_size
                && size > 0
            {
                self.min_font_size = size;
            }
            if let Some(size) = render.max_font_size
                && size > 0
            {
                self.max_font_size = size;
            }
            if let Some(spacing) = render.line_spacing
                && spacing > 0.0
            {
                self.line_spacing = spacing;
            }
            if let Some(full) = render.full_resolution {
                self.full_resolution = full;
            }
        }
        if let Some(translate) = incoming.translate {
            if let Some(lang) = translate.source_lang
                && !lang.trim().is_empty()
            {
                self.source_lang = lang.trim().to_uppercase();
            }
            if let Some(lang) = translate.target_lang
                && !lang.trim().is_empty()
            {
                self.target_lang = lang.trim().to_uppercase();
            }
            if let Some(size) = translate.cache_size {
                self.translate_cache_size = size;
            }
        }
        if self.min_font_size > self.max_font_size {
            return Err(anyhow!(
                "min_font_size {} is larger than max_font_size {}",
                self.min_font_size,
                self.max_font_size
            ));
        }
        Ok(())
    }
}

fn check_margin(name: &str, value: f32) -> Result<f32> {
    if (0.0..0.5).contains(&value) {
        Ok(value)
    } else {
        Err(anyhow!("{} must be in [0, 0.5), got {}", name, value))
    }
}

fn check_inpaint_radius(value: u32) -> Result<u32> {
    if (1..=MAX_INPAINT_RADIUS).contains(&value) {
        Ok(value)
    } else {
        Err(anyhow!(
            "inpaint_radius must be in [1, {}], got {}",
            MAX_INPAINT_RADIUS,
            value
        ))
    }
}

/// Parses `#rrggbb` or `rrggbb`.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(anyhow!("invalid color '{}': expected #rrggbb", value));
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16);
    Ok([channel(0)?, channel(2)?, channel(4)?])
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

pub(crate) fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".manga-translator-rust"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::with_temp_home;

    #[test]
    fn bundled_defaults_match_built_in_defaults() {
        let mut settings = Settings::default();
        let parsed: SettingsFile = toml::from_str(DEFAULT_SETTINGS_TOML).unwrap();
        settings.merge(parsed).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.render_config(), RenderConfig::default());
    }

    #[test]
    fn first_run_writes_home_settings() {
        with_temp_home(|home| {
            load_settings(None).unwrap();
            let written = home.join(".manga-translator-rust/settings.toml");
            assert_eq!(fs::read_to_string(written).unwrap(), DEFAULT_SETTINGS_TOML);
        });
    }

    #[test]
    fn later_files_override_earlier_ones() {
        with_temp_home(|home| {
            let dir = home.join(".manga-translator-rust");
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("settings.local.toml"),
                "[render]\nfont_color = \"#ff8000\"\nmax_font_size = 40\n",
            )
            .unwrap();
            let extra = home.join("extra.toml");
            fs::write(&extra, "[render]\nmax_font_size = 30\n[translate]\ntarget_lang = \"de\"\n")
                .unwrap();

            let settings = load_settings(Some(&extra)).unwrap();
            assert_eq!(settings.font_color, [0xff, 0x80, 0x00]);
            assert_eq!(settings.max_font_size, 30);
            assert_eq!(settings.target_lang, "DE");
            assert_eq!(settings.ocr_max_width, 2000);
        });
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        with_temp_home(|home| {
            let err = load_settings(Some(&home.join("nope.toml"))).unwrap_err();
            assert!(err.to_string().contains("settings file not found"));
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        with_temp_home(|home| {
            let extra = home.join("bad.toml");
            fs::write(&extra, "[render]\nfont_color = \"black\"\n").unwrap();
            assert!(load_settings(Some(&extra)).is_err());
            fs::write(&extra, "[render]\nmin_font_size = 50\nmax_font_size = 20\n").unwrap();
            assert!(load_settings(Some(&extra)).is_err());
            fs::write(&extra, "[render]\ninpaint_radius = 70000\n").unwrap();
            let err = load_settings(Some(&extra)).unwrap_err();
            assert!(format!("{:#}", err).contains("inpaint_radius"));
            fs::write(&extra, "[render]\ninpaint_radius = 0\n").unwrap();
            assert!(load_settings(Some(&extra)).is_err());
            fs::write(&extra, "[render]\ninpaint_radius = 30\n").unwrap();
            assert_eq!(load_settings(Some(&extra)).unwrap().inpaint_radius, 30);
        });
    }

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_color("#000000").unwrap(), [0, 0, 0]);
        assert_eq!(parse_hex_color("1a2B3c").unwrap(), [0x1a, 0x2b, 0x3c]);
        assert!(parse_hex_color("#12345").is_err());
    }
}

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::info;

pub mod batch;
pub mod cache;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod settings;
mod test_util;
pub mod translator;

pub use batch::{BatchContext, BatchFailure, BatchReport, run_batch, scan_folder};
pub use cache::{CacheStats, FifoCache};
pub use error::PipelineError;
pub use pipeline::{PageAnalysis, PagePipeline};
pub use providers::{DeepL, TranslateFuture, TranslationService};
pub use translator::CachedTranslator;

const OUTPUT_DIR_NAME: &str = "translated";

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Image file or folder of images.
    pub data: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub lang: Option<String>,
    pub source_lang: Option<String>,
    pub key: Option<String>,
    pub settings_path: Option<String>,
    pub font_path: Option<String>,
    pub max_width: Option<u32>,
    pub debug_ocr: bool,
    pub show_ocr_languages: bool,
}

/// Runs the CLI flow and returns the text to print.
pub async fn run(config: Config, cancel: &AtomicBool) -> Result<String> {
    if config.show_ocr_languages {
        let langs = ocr::list_tesseract_languages()?;
        return Ok(langs.join("\n"));
    }

    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    apply_overrides(&mut settings, &config);

    let data = config
        .data
        .as_deref()
        .ok_or_else(|| anyhow!("--data is required (image file or folder)"))?;
    let images = collect_images(data)?;
    if images.is_empty() {
        return Err(anyhow!("no supported images found in {}", data.display()));
    }
    let output_dir = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_dir(data));

    let key = providers::resolve_key(config.key.as_deref())?;
    let service = DeepL::new(key)?;
    let recognizer = ocr::TesseractRecognizer::new(&settings.ocr_languages, settings.ocr_psm)
        .with_context(|| "OCR engine is not available")?;
    info!(
        "{} image(s), {} -> {}, output {}",
        images.len(),
        settings.source_lang,
        settings.target_lang,
        output_dir.display()
    );

    let mut ctx = BatchContext {
        pipeline: PagePipeline::new(
            recognizer,
            ocr::ResultCache::new(settings.ocr_cache_size),
            settings.ocr_max_width,
        ),
        translator: CachedTranslator::new(service, settings.translate_cache_size),
        renderer: ocr::Renderer::new(settings.render_config()),
        source_lang: settings.source_lang.clone(),
        target_lang: settings.target_lang.clone(),
        full_resolution: settings.full_resolution,
        debug_ocr: config.debug_ocr,
    };
    let report = run_batch(&images, &mut ctx, &output_dir, cancel).await?;
    if report.outputs.is_empty() && !report.failures.is_empty() {
        return Err(anyhow!("{}", format_report(&report)));
    }
    Ok(format_report(&report))
}

fn apply_overrides(settings: &mut settings::Settings, config: &Config) {
    if let Some(lang) = config.lang.as_deref().filter(|v| !v.trim().is_empty()) {
        settings.target_lang = lang.trim().to_uppercase();
    }
    if let Some(lang) = config.source_lang.as_deref().filter(|v| !v.trim().is_empty()) {
        settings.source_lang = lang.trim().to_uppercase();
    }
    if let Some(path) = config.font_path.as_deref().filter(|v| !v.trim().is_empty()) {
        settings.font_path = Some(PathBuf::from(path));
    }
    if let Some(width) = config.max_width.filter(|w| *w > 0) {
        settings.ocr_max_width = width;
    }
}

fn collect_images(data: &Path) -> Result<Vec<PathBuf>> {
    if data.is_dir() {
        scan_folder(data)
    } else if data.is_file() {
        Ok(vec![data.to_path_buf()])
    } else {
        Err(anyhow!("input not found: {}", data.display()))
    }
}

fn default_output_dir(data: &Path) -> PathBuf {
    let base = if data.is_dir() {
        data
    } else {
        data.parent().unwrap_or_else(|| Path::new("."))
    };
    base.join(OUTPUT_DIR_NAME)
}

pub fn format_report(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for output in &report.outputs {
        lines.push(format!("ok      {}", output.display()));
    }
    for failure in &report.failures {
        lines.push(format!(
            "failed  {}: {}",
            failure.source.display(),
            failure.message
        ));
    }
    let mut summary = format!(
        "{} translated, {} failed",
        report.outputs.len(),
        report.failures.len()
    );
    if report.cancelled {
        summary.push_str(" (cancelled)");
    }
    lines.push(summary);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_win_over_settings() {
        let mut settings = settings::Settings::default();
        let config = Config {
            lang: Some("de".to_string()),
            source_lang: Some(" ja ".to_string()),
            max_width: Some(1200),
            font_path: Some("/fonts/comic.ttf".to_string()),
            ..Config::default()
        };
        apply_overrides(&mut settings, &config);
        assert_eq!(settings.target_lang, "DE");
        assert_eq!(settings.source_lang, "JA");
        assert_eq!(settings.ocr_max_width, 1200);
        assert_eq!(settings.font_path, Some(PathBuf::from("/fonts/comic.ttf")));
    }

    #[test]
    fn output_defaults_to_a_translated_subfolder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("page.png");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(default_output_dir(dir.path()), dir.path().join("translated"));
        assert_eq!(default_output_dir(&file), dir.path().join("translated"));
        assert!(collect_images(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn report_lists_outputs_and_failures() {
        let report = BatchReport {
            outputs: vec![PathBuf::from("out/01_translated.png")],
            failures: vec![BatchFailure {
                source: PathBuf::from("in/02.png"),
                message: "failed to decode image".to_string(),
            }],
            cancelled: true,
        };
        insta::assert_snapshot!(format_report(&report), @r"
        ok      out/01_translated.png
        failed  in/02.png: failed to decode image
        1 translated, 1 failed (cancelled)
        ");
    }
}

use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::error::PipelineError;
use crate::ocr::{Polygon, Recognizer, Renderer, build_ocr_debug_config, render_debug_overlay};
use crate::pipeline::PagePipeline;
use crate::providers::TranslationService;
use crate::translator::CachedTranslator;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "webp"];
const FAILURE_MESSAGE_CHARS: usize = 50;

/// Long-lived collaborators shared by every page of a batch.
pub struct BatchContext<R: Recognizer, T: TranslationService> {
    pub pipeline: PagePipeline<R>,
    pub translator: CachedTranslator<T>,
    pub renderer: Renderer,
    pub source_lang: String,
    pub target_lang: String,
    /// Render onto the original image instead of the normalized one.
    pub full_resolution: bool,
    pub debug_ocr: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub source: PathBuf,
    /// First 50 characters of the error; the full chain is logged.
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
}

/// Lists supported images in `dir`, sorted by lowercase file name.
pub fn scan_folder(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("not a directory: {}", dir.display()));
    }
    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_supported_image(&path) {
            images.push(path);
        }
    }
    images.sort_by_key(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });
    Ok(images)
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

pub fn output_path_for(source: &Path, output_dir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "page".to_string());
    output_dir.join(format!("{}_translated.png", stem))
}

/// Processes `images` one after another. A failing page is recorded and the
/// batch moves on; a set `cancel` flag stops before the next page.
pub async fn run_batch<R: Recognizer, T: TranslationService>(
    images: &[PathBuf],
    ctx: &mut BatchContext<R, T>,
    output_dir: &Path,
    cancel: &AtomicBool,
) -> Result<BatchReport> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

    let mut report = BatchReport::default();
    for (idx, path) in images.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            info!("batch cancelled after {} of {} images", idx, images.len());
            report.cancelled = true;
            break;
        }
        info!("[{}/{}] {}", idx + 1, images.len(), path.display());
        match process_page(path, ctx, output_dir).await {
            Ok(output) => {
                info!("wrote {}", output.display());
                report.outputs.push(output);
            }
            Err(err) => {
                warn!("failed {}: {:#}", path.display(), err);
                report.failures.push(BatchFailure {
                    source: path.clone(),
                    message: truncate_message(&format!("{:#}", err)),
                });
            }
        }
    }
    info!(
        "batch done: {} written, {} failed",
        report.outputs.len(),
        report.failures.len()
    );
    Ok(report)
}

async fn process_page<R: Recognizer, T: TranslationService>(
    path: &Path,
    ctx: &mut BatchContext<R, T>,
    output_dir: &Path,
) -> Result<PathBuf> {
    let analysis = ctx.pipeline.analyze_path(path)?;
    let texts: Vec<String> = analysis.blocks.iter().map(|b| b.text.clone()).collect();
    let translated = ctx
        .translator
        .translate_many(&texts, &ctx.source_lang, &ctx.target_lang)
        .await?;
    if translated.len() != texts.len() {
        return Err(PipelineError::TranslationLength {
            expected: texts.len(),
            got: translated.len(),
        }
        .into());
    }

    let pack = &analysis.pack;
    let polygons: Vec<Polygon> = analysis.blocks.iter().map(|b| b.polygon).collect();
    let output = if ctx.full_resolution {
        let (w, h) = pack.original.dimensions();
        let scaled: Vec<Polygon> = polygons
            .iter()
            .map(|p| p.scaled(pack.inverse_scale).clamped(w, h))
            .collect();
        ctx.renderer.render(&pack.original, &scaled, &translated)?
    } else {
        ctx.renderer.render(&pack.normalized, &polygons, &translated)?
    };

    if ctx.debug_ocr {
        let config = build_ocr_debug_config(output_dir, path)?;
        render_debug_overlay(&config, &pack.normalized, &analysis.candidates, &analysis.blocks)?;
    }

    let out_path = output_path_for(path, output_dir);
    output
        .save(&out_path)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    Ok(out_path)
}

fn truncate_message(message: &str) -> String {
    message.chars().take(FAILURE_MESSAGE_CHARS).collect()
}

use anyhow::{Context, Result, anyhow};
use image::RgbImage;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::ocr::Fragment;

use super::Recognizer;
use super::parse::parse_tsv_fragments;

/// Recognition source backed by the `tesseract` command line tool.
///
/// Construction checks the binary and language data once; the handle is then
/// reused for every page.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    languages: String,
    psm: u32,
}

impl TesseractRecognizer {
    pub fn new(languages: &str, psm: u32) -> Result<Self> {
        let available = list_tesseract_languages()
            .map_err(|err| PipelineError::RecognizerUnavailable(format!("{:#}", err)))?;
        let languages = select_languages(languages, &available)?;
        debug!("tesseract ready (languages {}, psm {})", languages, psm);
        Ok(Self { languages, psm })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<Fragment>> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = run_tesseract_tsv(tmp.path(), &self.languages, self.psm)?;
        let (width, height) = image.dimensions();
        Ok(parse_tsv_fragments(&tsv, width, height))
    }
}

pub fn list_tesseract_languages() -> Result<Vec<String>> {
    let output = Command::new("tesseract")
        .arg("--list-langs")
        .output()
        .with_context(|| "failed to run tesseract --list-langs")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract --list-langs failed: {}", stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect())
}

fn select_languages(requested: &str, available: &[String]) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::RecognizerUnavailable("ocr languages is empty".to_string()).into());
    }

    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(PipelineError::RecognizerUnavailable(format!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ))
        .into());
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

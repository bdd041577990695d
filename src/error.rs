use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("polygon/translation count mismatch: {polygons} polygons, {texts} texts")]
    CountMismatch { polygons: usize, texts: usize },

    #[error("text recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    #[error("failed to decode image {}: {reason}", path.display())]
    ImageDecode { path: PathBuf, reason: String },

    #[error("translation returned {got} texts for {expected} inputs")]
    TranslationLength { expected: usize, got: usize },
}

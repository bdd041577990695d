use image::RgbImage;
use std::sync::Arc;

use crate::cache::FifoCache;

use super::Fragment;

pub const DEFAULT_RESULT_CACHE_SIZE: usize = 10;

/// Identity of one recognition run: the image source plus the width it was
/// normalized to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: String,
    pub max_width: u32,
}

impl CacheKey {
    pub fn new(identity: impl Into<String>, max_width: u32) -> Self {
        Self {
            identity: identity.into(),
            max_width,
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|w{}", self.identity, self.max_width)
    }
}

/// Everything recognition produced for one page.
#[derive(Debug, Clone)]
pub struct OcrPack {
    pub normalized: RgbImage,
    /// Non-empty fragments in normalized-image coordinates.
    pub fragments: Vec<Fragment>,
    pub original: RgbImage,
    pub inverse_scale: f32,
}

pub type ResultCache = FifoCache<CacheKey, Arc<OcrPack>>;

use anyhow::Result;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::ocr::{
    BubbleCandidate, CacheKey, Fragment, OcrPack, Recognizer, ResultCache, TextBlock,
    detect_bubble_candidates, load_image, merge_fragments, normalize_scale, to_rgb_flattened,
};

/// Everything known about one page after merging.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    pub pack: Arc<OcrPack>,
    pub candidates: Vec<BubbleCandidate>,
    /// Merged blocks, top to bottom, in normalized-image coordinates.
    pub blocks: Vec<TextBlock>,
}

/// Recognition front end: owns the recognizer handle and the result cache so
/// both are created once and reused for every page.
pub struct PagePipeline<R: Recognizer> {
    recognizer: R,
    cache: ResultCache,
    max_width: u32,
}

impl<R: Recognizer> PagePipeline<R> {
    pub fn new(recognizer: R, cache: ResultCache, max_width: u32) -> Self {
        Self {
            recognizer,
            cache,
            max_width,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ResultCache {
        &mut self.cache
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn analyze_path(&mut self, path: &Path) -> Result<PageAnalysis> {
        let key = CacheKey::new(path.to_string_lossy(), self.max_width);
        let pack = match self.cache.get(&key) {
            Some(pack) => {
                info!("ocr cache hit: {}", key);
                pack.clone()
            }
            None => {
                let started = Instant::now();
                let image = to_rgb_flattened(&load_image(path)?);
                debug!("read {} in {:?}", path.display(), started.elapsed());
                self.recognize_and_store(key, image)?
            }
        };
        Ok(merge_pack(pack))
    }

    /// Same as [`analyze_path`](Self::analyze_path) for an image already in
    /// memory; `identity` stands in for the path in the cache key.
    pub fn analyze_image(&mut self, identity: &str, image: RgbImage) -> Result<PageAnalysis> {
        let key = CacheKey::new(identity, self.max_width);
        let pack = match self.cache.get(&key) {
            Some(pack) => {
                info!("ocr cache hit: {}", key);
                pack.clone()
            }
            None => self.recognize_and_store(key, image)?,
        };
        Ok(merge_pack(pack))
    }

    fn recognize_and_store(&mut self, key: CacheKey, original: RgbImage) -> Result<Arc<OcrPack>> {
        info!("ocr cache miss: {}", key);
        let started = Instant::now();
        let normalized = normalize_scale(&original, self.max_width);
        debug!("normalize in {:?}", started.elapsed());

        let started = Instant::now();
        let fragments: Vec<Fragment> = self
            .recognizer
            .recognize(&normalized.image)?
            .into_iter()
            .filter(|fragment| !fragment.text.trim().is_empty())
            .collect();
        debug!(
            "recognized {} fragments in {:?}",
            fragments.len(),
            started.elapsed()
        );

        let pack = Arc::new(OcrPack {
            inverse_scale: normalized.inverse_scale(),
            normalized: normalized.image,
            fragments,
            original,
        });
        self.cache.insert(key, pack.clone());
        Ok(pack)
    }
}

fn merge_pack(pack: Arc<OcrPack>) -> PageAnalysis {
    let started = Instant::now();
    let candidates = detect_bubble_candidates(&pack.normalized);
    let blocks = merge_fragments(&candidates, &pack.fragments);
    info!(
        "{} fragments -> {} blocks ({} bubble candidates) in {:?}",
        pack.fragments.len(),
        blocks.len(),
        candidates.len(),
        started.elapsed()
    );
    PageAnalysis {
        pack,
        candidates,
        blocks,
    }
}

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::cache::{CacheStats, FifoCache};
use crate::error::PipelineError;
use crate::providers::TranslationService;

pub const DEFAULT_TRANSLATION_CACHE_SIZE: usize = 1000;

type TranslationKey = (String, String, String);

/// Memoizing front for a [`TranslationService`].
///
/// Entries are keyed by (source, target, text) and evicted oldest first. Only
/// cache misses reach the backend, each distinct text once per call.
pub struct CachedTranslator<T: TranslationService> {
    service: T,
    cache: FifoCache<TranslationKey, String>,
}

impl<T: TranslationService> CachedTranslator<T> {
    pub fn new(service: T, capacity: usize) -> Self {
        Self {
            service,
            cache: FifoCache::new(capacity),
        }
    }

    pub fn service(&self) -> &T {
        &self.service
    }

    /// Translates `texts` one to one. Blank entries are returned unchanged
    /// without a backend call.
    pub async fn translate_many(
        &mut self,
        texts: &[String],
        source_lang: &str,
        target_lang: &str,
    ) -> Result<Vec<String>> {
        let source = source_lang.to_uppercase();
        let target = target_lang.to_uppercase();
        let key = |text: &str| (source.clone(), target.clone(), text.to_string());

        let mut results: Vec<Option<String>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for text in texts {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                results.push(Some(text.clone()));
                continue;
            }
            match self.cache.get(&key(trimmed)) {
                Some(hit) => results.push(Some(hit.clone())),
                None => {
                    if seen.insert(trimmed.to_string()) {
                        misses.push(trimmed.to_string());
                    }
                    results.push(None);
                }
            }
        }

        let mut fresh: HashMap<String, String> = HashMap::new();
        if misses.is_empty() {
            if !texts.is_empty() {
                info!("translation cache hit: {} texts", texts.len());
            }
        } else {
            debug!(
                "translation cache: {} hits, {} to translate via {}",
                texts.len() - results.iter().filter(|r| r.is_none()).count(),
                misses.len(),
                self.service.name()
            );
            let translated = self
                .service
                .translate_many(misses.clone(), &source, &target)
                .await?;
            if translated.len() != misses.len() {
                return Err(PipelineError::TranslationLength {
                    expected: misses.len(),
                    got: translated.len(),
                }
                .into());
            }
            for (text, translation) in misses.into_iter().zip(translated) {
                self.cache.insert(key(&text), translation.clone());
                fresh.insert(text, translation);
            }
        }

        let mut output = Vec::with_capacity(texts.len());
        for (text, result) in texts.iter().zip(results) {
            let value = match result {
                Some(value) => value,
                None => fresh
                    .get(text.trim())
                    .cloned()
                    .unwrap_or_else(|| text.clone()),
            };
            output.push(value);
        }
        Ok(output)
    }

    pub fn clear(&mut self) {
        let size = self.cache.len();
        self.cache.clear();
        info!("translation cache cleared: {} entries", size);
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TranslateFuture;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Upper {
        calls: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl TranslationService for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn translate_many(&self, texts: Vec<String>, _: &str, target: &str) -> TranslateFuture {
            self.calls.lock().unwrap().push(texts.clone());
            let target = target.to_string();
            Box::pin(async move {
                Ok(texts
                    .into_iter()
                    .map(|t| format!("{}:{}", target, t.to_uppercase()))
                    .collect())
            })
        }
    }

    struct Short;

    impl TranslationService for Short {
        fn name(&self) -> &'static str {
            "short"
        }

        fn translate_many(&self, _: Vec<String>, _: &str, _: &str) -> TranslateFuture {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn only_misses_reach_the_backend() {
        let service = Upper::default();
        let calls = service.calls.clone();
        let mut translator = CachedTranslator::new(service, DEFAULT_TRANSLATION_CACHE_SIZE);

        let first = translator
            .translate_many(&strings(&["hello", "world"]), "en", "fr")
            .await
            .unwrap();
        assert_eq!(first, ["FR:HELLO", "FR:WORLD"]);

        let second = translator
            .translate_many(&strings(&["world", "again", "  ", "again"]), "EN", "FR")
            .await
            .unwrap();
        assert_eq!(second, ["FR:WORLD", "FR:AGAIN", "  ", "FR:AGAIN"]);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], ["again"]);
    }

    #[tokio::test]
    async fn language_pair_is_part_of_the_key() {
        let mut translator = CachedTranslator::new(Upper::default(), 10);
        translator.translate_many(&strings(&["hi"]), "en", "fr").await.unwrap();
        let german = translator.translate_many(&strings(&["hi"]), "en", "de").await.unwrap();
        assert_eq!(german, ["DE:HI"]);
        assert_eq!(translator.stats(), CacheStats { size: 2, capacity: 10 });
        translator.clear();
        assert_eq!(translator.stats().size, 0);
    }

    #[tokio::test]
    async fn short_backend_reply_is_an_error() {
        let mut translator = CachedTranslator::new(Short, 10);
        let err = translator
            .translate_many(&strings(&["a", "b"]), "en", "fr")
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TranslationLength { expected: 2, got: 0 })
        ));
    }

    #[tokio::test]
    async fn disabled_cache_still_translates() {
        let mut translator = CachedTranslator::new(Upper::default(), 0);
        let out = translator
            .translate_many(&strings(&["one", "two"]), "en", "fr")
            .await
            .unwrap();
        assert_eq!(out, ["FR:ONE", "FR:TWO"]);
    }
}

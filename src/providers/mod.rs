use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

mod deepl;
pub(crate) mod retry;

pub use deepl::DeepL;

pub type TranslateFuture = Pin<Box<dyn Future<Output = Result<Vec<String>>> + Send>>;

/// Batch text-in/text-out translation backend.
///
/// The returned list must have the same length and order as `texts`; callers
/// verify this.
pub trait TranslationService: Send + Sync {
    fn name(&self) -> &'static str;
    fn translate_many(&self, texts: Vec<String>, source_lang: &str, target_lang: &str) -> TranslateFuture;
}

impl<T: TranslationService + ?Sized> TranslationService for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn translate_many(&self, texts: Vec<String>, source_lang: &str, target_lang: &str) -> TranslateFuture {
        (**self).translate_many(texts, source_lang, target_lang)
    }
}

pub fn resolve_key(override_key: Option<&str>) -> Result<String> {
    if let Some(key) = override_key
        && !key.trim().is_empty()
    {
        return Ok(key.trim().to_string());
    }
    match std::env::var("DEEPL_API_KEY") {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => Err(anyhow::anyhow!(
            "missing DeepL API key (pass --key or set DEEPL_API_KEY)"
        )),
    }
}

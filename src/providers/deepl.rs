use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::retry::{
    RATE_LIMIT_BASE_DELAY, RATE_LIMIT_MAX_RETRIES, is_rate_limited, retry_after, wait_with_backoff,
};
use super::{TranslateFuture, TranslationService};

const FREE_BASE_URL: &str = "https://api-free.deepl.com";
const PRO_BASE_URL: &str = "https://api.deepl.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DeepL {
    key: String,
    base_url: String,
    client: reqwest::Client,
}

impl DeepL {
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(anyhow!("missing DeepL API key"));
        }
        let base_url = std::env::var("DEEPL_BASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| default_base_url(&key).to_string());
        Self::with_base_url(key, base_url)
    }

    pub fn with_base_url(key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self {
            key: key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/v2/translate", self.base_url)
    }
}

/// Free-plan keys carry a `:fx` suffix.
fn default_base_url(key: &str) -> &'static str {
    if key.ends_with(":fx") {
        FREE_BASE_URL
    } else {
        PRO_BASE_URL
    }
}

fn build_form(texts: &[String], source_lang: &str, target_lang: &str) -> Vec<(&'static str, String)> {
    let mut form: Vec<(&'static str, String)> =
        texts.iter().map(|text| ("text", text.clone())).collect();
    form.push(("source_lang", source_lang.to_uppercase()));
    form.push(("target_lang", target_lang.to_uppercase()));
    form
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    #[serde(default)]
    text: String,
}

fn parse_translations(body: &str) -> Result<Vec<String>> {
    let parsed: TranslateResponse =
        serde_json::from_str(body).with_context(|| "failed to parse DeepL response")?;
    Ok(parsed.translations.into_iter().map(|t| t.text).collect())
}

fn error_snippet(body: &str) -> String {
    body.chars().take(200).collect()
}

impl TranslationService for DeepL {
    fn name(&self) -> &'static str {
        "DeepL"
    }

    fn translate_many(&self, texts: Vec<String>, source_lang: &str, target_lang: &str) -> TranslateFuture {
        let provider = self.clone();
        let form = build_form(&texts, source_lang, target_lang);
        Box::pin(async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let url = provider.url();
            let mut attempt = 0usize;
            let mut delay = RATE_LIMIT_BASE_DELAY;
            loop {
                attempt += 1;
                let response = provider
                    .client
                    .post(&url)
                    .header("Authorization", format!("DeepL-Auth-Key {}", provider.key))
                    .form(&form)
                    .send()
                    .await
                    .with_context(|| format!("DeepL request failed: {}", url))?;

                let status = response.status();
                let retry_after = retry_after(response.headers());
                let text = response.text().await.unwrap_or_default();
                if status.is_success() {
                    let translations = parse_translations(&text)?;
                    debug!("DeepL translated {} texts", translations.len());
                    return Ok(translations);
                }
                if is_rate_limited(status) && attempt < RATE_LIMIT_MAX_RETRIES {
                    delay = wait_with_backoff("DeepL", attempt, delay, retry_after).await;
                    continue;
                }
                return Err(anyhow!("DeepL API error ({}): {}", status, error_snippet(&text)));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_suffix_selects_endpoint() {
        assert_eq!(default_base_url("abc:fx"), FREE_BASE_URL);
        assert_eq!(default_base_url("abc"), PRO_BASE_URL);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert!(DeepL::new("  ").is_err());
    }

    #[test]
    fn form_repeats_text_and_uppercases_languages() {
        let texts = vec!["Hello".to_string(), "World !".to_string()];
        let form = build_form(&texts, "en", "fr");
        assert_eq!(
            form,
            vec![
                ("text", "Hello".to_string()),
                ("text", "World !".to_string()),
                ("source_lang", "EN".to_string()),
                ("target_lang", "FR".to_string()),
            ]
        );
    }

    #[test]
    fn response_texts_keep_order() {
        let body = r#"{"translations":[{"detected_source_language":"EN","text":"Bonjour"},{"text":"Monde !"}]}"#;
        assert_eq!(parse_translations(body).unwrap(), ["Bonjour", "Monde !"]);
        assert!(parse_translations("not json").is_err());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = DeepL::with_base_url("k", "http://localhost:9000/").unwrap();
        assert_eq!(client.url(), "http://localhost:9000/v2/translate");
    }
}

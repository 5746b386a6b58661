use std::sync::Arc;

use lexilight_core::errors::classify;
use lexilight_core::language::{detect, localize};
use lexilight_core::{cache_key, AnnotationCache, ErrorInfo, Language, RateLimiter};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::HighlightConfig;
use crate::generator::GenerativeClient;

pub type Analysis = Result<String, ErrorInfo>;

/// Funnels every analysis request through the cache, the rate limiter and
/// the error classifier. Only hover results are cached.
pub struct AnalysisPipeline {
    client: RwLock<Option<Arc<dyn GenerativeClient>>>,
    locale: RwLock<Option<String>>,
    cache: Mutex<AnnotationCache>,
    limiter: Mutex<RateLimiter>,
    context_key_chars: usize,
    prompt_context_chars: usize,
}

impl AnalysisPipeline {
    pub fn new(config: &HighlightConfig) -> Self {
        Self {
            client: RwLock::new(None),
            locale: RwLock::new(None),
            cache: Mutex::new(AnnotationCache::new(config.cache_capacity)),
            limiter: Mutex::new(RateLimiter::new(
                config.rate_limit_requests,
                config.rate_limit_window(),
                now(),
            )),
            context_key_chars: config.context_key_chars,
            prompt_context_chars: config.prompt_context_chars,
        }
    }

    pub fn set_client(&self, client: Option<Arc<dyn GenerativeClient>>) {
        *self.client.write() = client;
    }

    pub fn is_configured(&self) -> bool {
        self.client.read().is_some()
    }

    /// Document-level locale used when the analyzed text itself does not
    /// reveal its language.
    pub fn set_locale(&self, locale: Option<String>) {
        *self.locale.write() = locale;
    }

    #[cfg(test)]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Short explanation of a hovered token, grounded in its surroundings.
    pub async fn hover_analyze(&self, token: &str, context: &str) -> Analysis {
        let key = cache_key(token, context, self.context_key_chars);
        if let Some(hit) = self.cache.lock().get(&key) {
            debug!(token, "serving hover analysis from cache");
            return Ok(hit);
        }

        let language = detect(token);
        let client = self.ready_client(language)?;
        let snippet: String = context.chars().take(self.prompt_context_chars).collect();
        let prompt = hover_prompt(token, &snippet, language);

        match client.generate(&prompt).await {
            Ok(text) => {
                let explanation = if text.trim().is_empty() {
                    localize(
                        "Nelze vygenerovat vysvětlení.",
                        "Unable to generate explanation.",
                        language,
                    )
                    .to_string()
                } else {
                    text
                };
                self.cache.lock().put(key, explanation.clone());
                Ok(explanation)
            }
            Err(failure) => {
                warn!(token, "hover analysis failed: {failure}");
                Err(classify(&failure.raw(), token))
            }
        }
    }

    /// Detailed explanation of a clicked token. Never cached.
    pub async fn click_analyze(&self, token: &str) -> Analysis {
        let language = detect(token);
        let prompt = click_prompt(token, language);
        self.uncached(token, &prompt, language).await
    }

    /// Topic and key points of an arbitrary selected passage. Never cached.
    pub async fn selection_analyze(&self, text: &str) -> Analysis {
        let language = detect(text);
        let prompt = selection_prompt(text, language);
        self.uncached(text, &prompt, language).await
    }

    async fn uncached(&self, analyzed: &str, prompt: &str, language: Language) -> Analysis {
        let client = self.ready_client(language)?;
        client.generate(prompt).await.map_err(|failure| {
            warn!("analysis request failed: {failure}");
            classify(&failure.raw(), analyzed)
        })
    }

    /// The configured client, after the request has been counted against
    /// the rate limit.
    fn ready_client(&self, language: Language) -> Result<Arc<dyn GenerativeClient>, ErrorInfo> {
        let Some(client) = self.client.read().clone() else {
            let locale = self.locale.read();
            return Err(ErrorInfo::not_configured(
                language.or_locale(locale.as_deref()),
            ));
        };
        self.limiter
            .lock()
            .check_limit(now())
            .map_err(|error| error.localized(language))?;
        Ok(client)
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

fn hover_prompt(token: &str, context: &str, language: Language) -> String {
    let name = language.prompt_name();
    format!(
        "Language: {name}\n\
         Word or phrase to analyze: \"{token}\"\n\n\
         Context from the webpage:\n\"{context}\"\n\n\
         Task: Analyze this word or phrase and explain its meaning or significance in {name} language.\n\
         Keep the explanation brief (1-2 sentences).\n\
         If it's a proper noun, explain what/who it refers to.\n\
         If it's a technical term, provide a simple definition.\n\
         If it's a common word, explain its usage in this context.\n\n\
         IMPORTANT: Your response MUST be in {name} language only.\n\
         For Czech words, use proper Czech grammar and diacritics."
    )
}

fn click_prompt(token: &str, language: Language) -> String {
    let name = language.prompt_name();
    format!(
        "Analyze the {name} word or phrase: \"{token}\"\n\n\
         Provide a detailed explanation including:\n\
         1. Definition or meaning\n\
         2. Usage examples\n\
         3. Any relevant additional information (etymology, related terms, etc.)\n\n\
         Response MUST be in {name} language.\n\
         Keep the total response under 4 sentences."
    )
}

fn selection_prompt(text: &str, language: Language) -> String {
    let name = language.prompt_name();
    format!(
        "Analyze this {name} text: \"{text}\"\n\n\
         Provide:\n\
         1. Main topic or meaning\n\
         2. Key points or insights\n\
         3. Any relevant context or explanation\n\n\
         Response MUST be in {name} language.\n\
         Keep the response concise (max 3-4 sentences)."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::testing::ScriptedClient;
    use lexilight_core::ErrorKind;
    use serde_json::json;

    fn pipeline_with(client: &Arc<ScriptedClient>) -> AnalysisPipeline {
        let pipeline = AnalysisPipeline::new(&HighlightConfig::default());
        pipeline.set_client(Some(client.clone()));
        pipeline
    }

    #[tokio::test]
    async fn hover_is_served_from_cache_on_repeat() {
        let client = ScriptedClient::new();
        client.push_ok("A large river.");
        let pipeline = pipeline_with(&client);

        let context = "The Vltava flows through Prague";
        assert_eq!(pipeline.hover_analyze("Vltava", context).await.unwrap(), "A large river.");
        assert_eq!(pipeline.hover_analyze("Vltava", context).await.unwrap(), "A large river.");
        assert_eq!(client.calls(), 1);
        assert_eq!(pipeline.cached_entries(), 1);
        assert!(client.prompts()[0].contains("Context from the webpage"));
    }

    #[tokio::test]
    async fn click_always_calls_service() {
        let client = ScriptedClient::new();
        let pipeline = pipeline_with(&client);
        pipeline.hover_analyze("Vltava", "ctx").await.unwrap();
        pipeline.click_analyze("Vltava").await.unwrap();
        pipeline.click_analyze("Vltava").await.unwrap();
        assert_eq!(client.calls(), 3);
        assert_eq!(pipeline.cached_entries(), 1);
        assert!(client.prompts()[1].contains("Definition or meaning"));
    }

    #[tokio::test]
    async fn missing_client_is_not_cached() {
        let pipeline = AnalysisPipeline::new(&HighlightConfig::default());
        let error = pipeline.hover_analyze("Vltava", "ctx").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::NotConfigured);
        assert_eq!(pipeline.cached_entries(), 0);

        let client = ScriptedClient::new();
        client.push_ok("River.");
        pipeline.set_client(Some(client.clone()));
        assert_eq!(pipeline.hover_analyze("Vltava", "ctx").await.unwrap(), "River.");
    }

    #[tokio::test]
    async fn not_configured_falls_back_to_document_locale() {
        let pipeline = AnalysisPipeline::new(&HighlightConfig::default());
        pipeline.set_locale(Some("cs".to_string()));
        let error = pipeline.selection_analyze("Prague castle").await.unwrap_err();
        assert!(error.message.starts_with("API klíč není nastaven"));
    }

    #[tokio::test]
    async fn failures_are_classified_and_not_cached() {
        let client = ScriptedClient::new();
        client.push_err(json!({"error": {"code": 404, "message": "models/x is not found"}}));
        client.push_ok("Recovered.");
        let pipeline = pipeline_with(&client);

        let error = pipeline.hover_analyze("Vltava", "ctx").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::ModelUnavailable);
        assert_eq!(pipeline.cached_entries(), 0);
        assert_eq!(pipeline.hover_analyze("Vltava", "ctx").await.unwrap(), "Recovered.");
    }

    #[tokio::test]
    async fn empty_reply_becomes_fallback_text() {
        let client = ScriptedClient::new();
        client.push_ok("   ");
        let pipeline = pipeline_with(&client);
        assert_eq!(
            pipeline.hover_analyze("Plzeň", "ctx").await.unwrap(),
            "Nelze vygenerovat vysvětlení."
        );
    }

    #[tokio::test]
    async fn rate_limit_blocks_thirty_first_request() {
        let client = ScriptedClient::new();
        let pipeline = pipeline_with(&client);
        for _ in 0..30 {
            pipeline.selection_analyze("some passage").await.unwrap();
        }
        let error = pipeline.click_analyze("Vltava").await.unwrap_err();
        assert_eq!(error.kind, ErrorKind::RateLimited);
        assert_eq!(error.retry_after_secs, Some(60));
        assert_eq!(client.calls(), 30);
    }
}

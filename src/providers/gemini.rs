//! Gemini `generateContent` producer.
//!
//! A thin REST call: the caller owns the request body and gets the raw JSON
//! response back. Failures come back as [`ProviderError`] kinds so the retry
//! executor can tell throttling from everything else.
//!
//! Thinking models return parts tagged `thought: true`; [`GeminiClient::extract_text`]
//! filters those out.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

use crate::cache::KeyBuilder;
use crate::config::ProviderConfig;

use super::{parse_provider_error, ProviderError};

/// Gemini v1beta REST API base.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model when none is configured.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Gemini REST client authenticated with an API key.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    client: Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            api_key: api_key.to_string(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        }
    }

    /// Point at a different API root (proxies, local mocks).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Build from config. Returns `None` when no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        let key = config.api_key.as_deref().filter(|k| !k.is_empty())?;
        let mut client = Self::new(key);
        if let Some(base) = config.base_url.as_deref().filter(|b| !b.is_empty()) {
            client = client.with_base_url(base);
        }
        Some(client)
    }

    /// Single-turn text request body.
    pub fn text_request(prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }]
        })
    }

    /// Cache key for a `generateContent` call: model plus full request body.
    pub fn request_key(model: &str, body: &Value) -> String {
        KeyBuilder::new("gemini.generateContent")
            .part(model)
            .json(body)
            .build()
    }

    /// POST `body` to `models/{model}:generateContent`.
    pub async fn generate_content(&self, model: &str, body: &Value) -> Result<Value, ProviderError> {
        debug!("Gemini request to model {}", model);

        let response = self
            .client
            .post(self.api_url(model))
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return response.json::<Value>().await.map_err(|e| {
                ProviderError::Unknown(format!("Failed to parse Gemini response: {}", e))
            });
        }

        let error_text = response.text().await.unwrap_or_default();
        Err(parse_provider_error(
            status.as_u16(),
            &Self::error_message(&error_text),
        ))
    }

    /// Pull `error.message` (and `error.status`) out of a Gemini error body,
    /// falling back to the raw text.
    pub fn error_message(error_text: &str) -> String {
        let parsed = serde_json::from_str::<Value>(error_text).ok();
        match parsed.as_ref().and_then(|v| v["error"]["message"].as_str()) {
            Some(message) => match parsed.as_ref().and_then(|v| v["error"]["status"].as_str()) {
                Some(status) => format!("Gemini API error ({}): {}", status, message),
                None => format!("Gemini API error: {}", message),
            },
            None => format!("Gemini API error: {}", error_text),
        }
    }

    /// Final answer text from a response, skipping thought parts. Falls back
    /// to thought text when that is all there is.
    pub fn extract_text(response: &Value) -> Option<String> {
        let parts = response["candidates"][0]["content"]["parts"].as_array()?;

        let final_parts: Vec<&str> = parts
            .iter()
            .filter(|p| !p["thought"].as_bool().unwrap_or(false))
            .filter_map(|p| p["text"].as_str())
            .collect();
        if !final_parts.is_empty() {
            return Some(final_parts.join(""));
        }

        let thought_parts: Vec<&str> = parts.iter().filter_map(|p| p["text"].as_str()).collect();
        if thought_parts.is_empty() {
            None
        } else {
            Some(thought_parts.join(""))
        }
    }

    fn api_url(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryClassify;

    #[test]
    fn test_extract_text_skips_thought_parts() {
        let response = json!({
            "candidates": [{"content": {"parts": [
                {"text": "Let me think...", "thought": true},
                {"text": "The answer is 4."}
            ]}}]
        });
        assert_eq!(
            GeminiClient::extract_text(&response).as_deref(),
            Some("The answer is 4.")
        );
    }

    #[test]
    fn test_extract_text_falls_back_to_thoughts() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "only thinking", "thought": true}]}}]
        });
        assert_eq!(
            GeminiClient::extract_text(&response).as_deref(),
            Some("only thinking")
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "Hello, "}, {"text": "world"}]}}]
        });
        assert_eq!(
            GeminiClient::extract_text(&response).as_deref(),
            Some("Hello, world")
        );
    }

    #[test]
    fn test_extract_text_none_without_parts() {
        assert!(GeminiClient::extract_text(&json!({"candidates": []})).is_none());
        let empty = json!({"candidates": [{"content": {"parts": []}}]});
        assert!(GeminiClient::extract_text(&empty).is_none());
    }

    #[test]
    fn test_error_message_from_body() {
        let body = r#"{"error":{"code":429,"message":"Quota exceeded","status":"RESOURCE_EXHAUSTED"}}"#;
        assert_eq!(
            GeminiClient::error_message(body),
            "Gemini API error (RESOURCE_EXHAUSTED): Quota exceeded"
        );
        assert_eq!(
            GeminiClient::error_message("upstream exploded"),
            "Gemini API error: upstream exploded"
        );
    }

    #[test]
    fn test_http_429_body_classifies_as_rate_limited() {
        let body = r#"{"error":{"message":"Resource has been exhausted","status":"RESOURCE_EXHAUSTED"}}"#;
        let err = parse_provider_error(429, &GeminiClient::error_message(body));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_request_key_depends_on_model_and_body() {
        let body = GeminiClient::text_request("hello");
        let k1 = GeminiClient::request_key("gemini-2.0-flash", &body);
        let k2 = GeminiClient::request_key("gemini-2.5-pro", &body);
        let k3 = GeminiClient::request_key("gemini-2.0-flash", &GeminiClient::text_request("bye"));
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1, GeminiClient::request_key("gemini-2.0-flash", &body));
    }

    #[test]
    fn test_api_url_and_base_override() {
        let client = GeminiClient::new("k").with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(
            client.api_url("gemini-2.0-flash"),
            "http://localhost:8080/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = GeminiClient::new("super-secret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut cfg = ProviderConfig::default();
        cfg.api_key = None;
        assert!(GeminiClient::from_config(&cfg).is_none());
        cfg.api_key = Some(String::new());
        assert!(GeminiClient::from_config(&cfg).is_none());
        cfg.api_key = Some("key".into());
        assert!(GeminiClient::from_config(&cfg).is_some());
    }
}

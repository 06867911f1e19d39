//! Memoized Gemini text generation command handler.

use anyhow::{Context, Result};

use studiocache::config::Config;
use studiocache::memo::Memoizer;
use studiocache::providers::GeminiClient;

/// Handle `studiocache generate`.
pub(crate) async fn cmd_generate(
    config: &Config,
    model: Option<&str>,
    no_cache: bool,
    prompt: &str,
) -> Result<()> {
    let Some(client) = GeminiClient::from_config(&config.provider) else {
        anyhow::bail!("No Gemini API key configured. Set GEMINI_API_KEY or provider.api_key.");
    };
    let model = model.unwrap_or(&config.provider.model);

    let memo = Memoizer::open(config)
        .await
        .with_context(|| "Failed to open response cache")?
        .with_cache_enabled(config.cache.enabled && !no_cache);

    let body = GeminiClient::text_request(prompt);
    let key = GeminiClient::request_key(model, &body);
    let response = memo
        .run(&key, || client.generate_content(model, &body))
        .await
        .with_context(|| format!("Generation with {} failed", model))?;

    match GeminiClient::extract_text(&response) {
        Some(text) => println!("{}", text),
        None => println!("(model returned no text)"),
    }
    Ok(())
}

pub mod gemini;
pub mod openai_compat;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::FallbackProvider;
use crate::error::ProviderError;
use crate::types::{CompletionResponse, Message};

/// Trait for generative model providers.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request.
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;
}

/// Create the provider for the configured fallback kind.
pub fn create_provider(
    kind: FallbackProvider,
    api_key: &str,
    api_base: Option<&str>,
    default_model: &str,
) -> Arc<dyn LlmProvider> {
    match kind {
        FallbackProvider::Gemini => Arc::new(gemini::GeminiProvider::new(
            api_key.to_string(),
            api_base.map(|s| s.to_string()),
            default_model.to_string(),
        )),
        FallbackProvider::OpenAi => Arc::new(openai_compat::OpenAiCompatProvider::new(
            api_key.to_string(),
            api_base.map(|s| s.to_string()),
            default_model.to_string(),
        )),
    }
}

/// Read a `{"error": {"message": ...}}` body, falling back to the raw text.
pub(crate) fn api_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| body.to_string())
}

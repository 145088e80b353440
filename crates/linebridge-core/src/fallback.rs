//! Generative fallback for utterances the intent service could not match.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::FallbackConfig;
use crate::error::ProviderError;
use crate::provider::LlmProvider;
use crate::types::Message;

/// Returned when the model produced no text.
pub const EMPTY_REPLY: &str = "No response.";

/// Produces a short generative answer. Never fails; errors become a fixed
/// failure sentence.
#[async_trait]
pub trait FallbackGenerator: Send + Sync {
    async fn generate_fallback(&self, text: &str) -> String;
}

/// Fallback backed by an [`LlmProvider`].
pub struct GenerativeFallback {
    provider: Arc<dyn LlmProvider>,
    config: FallbackConfig,
    label: &'static str,
}

impl GenerativeFallback {
    pub fn new(provider: Arc<dyn LlmProvider>, config: FallbackConfig) -> Self {
        let label = config.provider_kind().label();
        Self {
            provider,
            config,
            label,
        }
    }

    /// The reply sent when the provider call fails.
    pub fn failure_reply(&self) -> String {
        format!("Failed to get response from {} AI.", self.label)
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "{}\n\nPlease respond in {} words or less.",
            text, self.config.max_words
        )
    }

    async fn try_generate(&self, text: &str) -> Result<String, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = self.config.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(self.prompt(text)));

        let response = self
            .provider
            .chat(
                &messages,
                &self.config.model,
                self.config.max_tokens,
                self.config.temperature,
            )
            .await?;

        debug!(
            "{} fallback used {} tokens",
            self.label, response.usage.total_tokens
        );

        Ok(sanitize_reply(
            response.content.as_deref().unwrap_or_default(),
            self.config.max_words,
        ))
    }
}

#[async_trait]
impl FallbackGenerator for GenerativeFallback {
    async fn generate_fallback(&self, text: &str) -> String {
        match self.try_generate(text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("{} fallback failed: {}", self.label, e);
                self.failure_reply()
            }
        }
    }
}

/// Flatten line breaks, trim, and cap the reply at `max_words` words.
///
/// Longer replies keep their first `max_words` words joined by single spaces
/// followed by `...`. Shorter replies are returned as-is after trimming.
pub fn sanitize_reply(text: &str, max_words: usize) -> String {
    let flattened = text.replace(['\r', '\n'], " ");
    let trimmed = flattened.trim();
    if trimmed.is_empty() {
        return EMPTY_REPLY.to_string();
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() > max_words {
        format!("{}...", words[..max_words].join(" "))
    } else {
        trimmed.to_string()
    }
}

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::ProviderError;
use crate::types::{CompletionResponse, FinishReason, Message, Role, TokenUsage};
use crate::util::http;

use super::{api_error_message, LlmProvider};

/// Google Gemini API provider.
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_base: Option<String>, default_model: String) -> Self {
        let base = api_base
            .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    /// Normalize model name: strip "gemini/" and "models/" prefixes.
    fn normalize_model(&self, model: &str) -> String {
        let model = model.strip_prefix("gemini/").unwrap_or(model);
        model.strip_prefix("models/").unwrap_or(model).to_string()
    }

    /// Split messages into the system instruction and the turn contents.
    fn convert_messages(
        &self,
        messages: &[Message],
    ) -> (Option<serde_json::Value>, Vec<serde_json::Value>) {
        let mut system_instruction = None;
        let mut contents = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    system_instruction = Some(json!({
                        "parts": [{"text": msg.content}]
                    }));
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content}]
                    }));
                }
                Role::Assistant => {
                    contents.push(json!({
                        "role": "model",
                        "parts": [{"text": msg.content}]
                    }));
                }
            }
        }

        (system_instruction, contents)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        let model_name = self.normalize_model(model);
        let url = format!("{}/models/{}:generateContent", self.api_base, model_name);

        let (system_instruction, contents) = self.convert_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature": temperature,
            },
        });

        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        debug!("Gemini request with model {}", model_name);

        let response = http::client()
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = http::error_body(response).await;
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        let data: serde_json::Value = response.json().await?;
        parse_gemini_response(&data)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

/// Parse a `generateContent` response.
pub fn parse_gemini_response(data: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
    let candidate = data
        .get("candidates")
        .and_then(|v| v.get(0))
        .ok_or_else(|| ProviderError::Parse("No candidates in response".to_string()))?;

    let text_content: String = candidate
        .get("content")
        .and_then(|v| v.get("parts"))
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let raw_reason = candidate.get("finishReason").and_then(|v| v.as_str());
    let finish_reason = match raw_reason {
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => FinishReason::Safety,
        _ => FinishReason::Stop,
    };

    // A blocked candidate carries no text to return.
    if finish_reason == FinishReason::Safety && text_content.is_empty() {
        return Err(ProviderError::Blocked(
            raw_reason.unwrap_or("SAFETY").to_string(),
        ));
    }

    let usage = data
        .get("usageMetadata")
        .map(|u| {
            let count = |key: &str| u.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
            TokenUsage {
                prompt_tokens: count("promptTokenCount"),
                completion_tokens: count("candidatesTokenCount"),
                total_tokens: count("totalTokenCount"),
            }
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: if text_content.is_empty() {
            None
        } else {
            Some(text_content)
        },
        finish_reason,
        usage,
    })
}

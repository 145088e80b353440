//! Intent detection against Dialogflow ES.

pub mod dto;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::DialogflowConfig;
use crate::error::IntentError;
use crate::google::TokenSource;
use crate::session::{session_or_generated, SessionIdSource};
use crate::types::IntentResult;
use crate::util::http;

pub use dto::QueryResult;
use dto::{DetectIntentRequest, DetectIntentResponse};

/// Reply used when the intent service cannot be reached or errors.
pub const APOLOGY: &str = "I'm having trouble processing your request. Please try again later.";

/// Placeholder reply when the service matched but produced no text.
pub const PLACEHOLDER: &str = "fallback";

/// Maps an utterance to a normalized answer. Never fails.
#[async_trait]
pub trait IntentDetector: Send + Sync {
    async fn resolve_intent(&self, text: &str, session_id: &str) -> IntentResult;
}

/// REST client for `detectIntent`.
pub struct DialogflowClient {
    config: DialogflowConfig,
    tokens: Arc<dyn TokenSource>,
    ids: Arc<dyn SessionIdSource>,
}

impl DialogflowClient {
    pub fn new(
        config: DialogflowConfig,
        tokens: Arc<dyn TokenSource>,
        ids: Arc<dyn SessionIdSource>,
    ) -> Self {
        Self { config, tokens, ids }
    }

    fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/v2beta1/projects/{}/agent/sessions/{}:detectIntent",
            self.config.api_base.trim_end_matches('/'),
            self.config.project_id,
            urlencoding::encode(session_id)
        )
    }

    /// Raw `detectIntent` call returning the service's query result.
    pub async fn detect(&self, text: &str, session_id: &str) -> Result<QueryResult, IntentError> {
        if self.config.project_id.is_empty() {
            return Err(IntentError::NoProject);
        }

        let session = session_or_generated(session_id, self.ids.as_ref());
        let token = self.tokens.access_token().await?;
        let url = self.session_url(&session);

        let response = http::client()
            .post(&url)
            .bearer_auth(token)
            .json(&DetectIntentRequest::text(text, &self.config.language_code))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IntentError::Api {
                status: status.as_u16(),
                message: http::error_body(response).await,
            });
        }

        let body: DetectIntentResponse = response.json().await?;
        body.query_result.ok_or(IntentError::MissingResult)
    }
}

#[async_trait]
impl IntentDetector for DialogflowClient {
    async fn resolve_intent(&self, text: &str, session_id: &str) -> IntentResult {
        match self.detect(text, session_id).await {
            Ok(result) => {
                let reply = select_answer(&result);
                debug!(
                    "Dialogflow matched {:?} (fallback: {})",
                    result.intent.as_ref().and_then(|i| i.display_name.as_deref()),
                    result.is_fallback()
                );
                IntentResult::new(reply, result.is_fallback())
            }
            Err(e) => {
                error!("Dialogflow detectIntent failed: {}", e);
                IntentResult::new(APOLOGY, true)
            }
        }
    }
}

/// Pick the reply text from a query result.
///
/// Knowledge answers win (highest `matchConfidence`, first on ties). Else a
/// non-empty fulfillment message list gives its first message with text.
/// Else `fulfillmentText`. Anything empty ends up as [`PLACEHOLDER`].
pub fn select_answer(result: &QueryResult) -> String {
    let from_knowledge = result
        .knowledge_answers
        .as_ref()
        .filter(|k| !k.answers.is_empty())
        .map(|k| {
            let mut best = &k.answers[0];
            for candidate in &k.answers[1..] {
                if candidate.match_confidence.unwrap_or(0.0) > best.match_confidence.unwrap_or(0.0)
                {
                    best = candidate;
                }
            }
            best.answer.clone()
        });

    let messages = result
        .fulfillment_messages
        .as_ref()
        .filter(|m| !m.is_empty());

    let reply = match (from_knowledge, messages) {
        (Some(answer), _) => Some(answer),
        // A non-empty message list claims the reply even when no entry has text.
        (None, Some(messages)) => messages
            .iter()
            .filter_map(|m| m.text.as_ref())
            .find_map(|t| t.text.first().cloned()),
        (None, None) => result
            .fulfillment_text
            .as_ref()
            .filter(|t| !t.trim().is_empty())
            .cloned(),
    };

    match reply {
        Some(reply) if !reply.is_empty() => reply,
        _ => PLACEHOLDER.to_string(),
    }
}

//! Wire types for the Dialogflow v2beta1 `detectIntent` call.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectIntentRequest<'a> {
    pub query_input: QueryInput<'a>,
}

#[derive(Debug, Serialize)]
pub struct QueryInput<'a> {
    pub text: TextInput<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInput<'a> {
    pub text: &'a str,
    pub language_code: &'a str,
}

impl<'a> DetectIntentRequest<'a> {
    pub fn text(text: &'a str, language_code: &'a str) -> Self {
        Self {
            query_input: QueryInput {
                text: TextInput {
                    text,
                    language_code,
                },
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectIntentResponse {
    #[serde(default)]
    pub query_result: Option<QueryResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryResult {
    pub query_text: Option<String>,
    pub knowledge_answers: Option<KnowledgeAnswers>,
    pub fulfillment_messages: Option<Vec<FulfillmentMessage>>,
    pub fulfillment_text: Option<String>,
    pub intent: Option<Intent>,
}

impl QueryResult {
    /// The classifier's fallback flag; missing means false.
    pub fn is_fallback(&self) -> bool {
        self.intent.as_ref().map(|i| i.is_fallback).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KnowledgeAnswers {
    pub answers: Vec<KnowledgeAnswer>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KnowledgeAnswer {
    pub answer: String,
    pub match_confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FulfillmentMessage {
    pub text: Option<MessageText>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessageText {
    pub text: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Intent {
    pub display_name: Option<String>,
    pub is_fallback: bool,
}

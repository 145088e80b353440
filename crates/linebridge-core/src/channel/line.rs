use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, error, info};

use crate::channel::Channel;
use crate::config::LineConfig;
use crate::error::ChannelError;
use crate::types::{InboundMessage, OutboundMessage};
use crate::util::http::client;

const LINE_PUSH_PATH: &str = "/v2/bot/message/push";

/// Header carrying the webhook body signature.
pub const SIGNATURE_HEADER: &str = "x-line-signature";

type HmacSha256 = Hmac<Sha256>;

/// LINE Messaging API channel.
pub struct LineChannel {
    config: LineConfig,
}

impl LineChannel {
    pub fn new(config: LineConfig) -> Self {
        Self { config }
    }

    /// Verify webhook signature using HMAC-SHA256.
    ///
    /// The header is the base64 digest of the raw body keyed by the channel
    /// secret. Comparison runs in constant time. An unset secret verifies
    /// nothing.
    pub fn verify_signature(channel_secret: &str, body: &[u8], signature: &str) -> bool {
        if channel_secret.is_empty() {
            return false;
        }
        let Ok(expected) = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            signature.trim(),
        ) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(channel_secret.as_bytes()) else {
            return false;
        };
        mac.update(body);
        mac.verify_slice(&expected).is_ok()
    }

    /// Compute the signature LINE would send for `body`.
    pub fn sign(channel_secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes())
            .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
        mac.update(body);
        base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            mac.finalize().into_bytes(),
        )
    }

    /// Verify and parse a webhook delivery.
    pub fn parse_signed_webhook(
        channel_secret: &str,
        body: &[u8],
        signature: &str,
    ) -> Result<Vec<LineEvent>, ChannelError> {
        if !Self::verify_signature(channel_secret, body, signature) {
            return Err(ChannelError::InvalidSignature);
        }
        let webhook: LineWebhook = serde_json::from_slice(body)?;
        Ok(webhook.events)
    }

    /// Parse LINE webhook events from the request body.
    pub fn parse_webhook_events(body: &str) -> Result<Vec<LineEvent>, serde_json::Error> {
        let webhook: LineWebhook = serde_json::from_str(body)?;
        Ok(webhook.events)
    }

    /// The inbound text message carried by `event`, if it is one.
    ///
    /// A missing source user id yields an empty `user_id`; the session layer
    /// replaces it with a generated id.
    pub fn text_message(event: &LineEvent) -> Option<InboundMessage> {
        if event.event_type != "message" {
            debug!("Ignoring LINE event type: {}", event.event_type);
            return None;
        }
        let message = event.message.as_ref()?;
        if message.msg_type != "text" {
            debug!("Ignoring non-text LINE message: {}", message.msg_type);
            return None;
        }

        let user_id = event
            .source
            .as_ref()
            .and_then(|s| s.user_id.as_deref())
            .unwrap_or_default();
        let text = message.text.as_deref().unwrap_or_default();

        info!("LINE message from {}: {}", user_id, text);
        Some(InboundMessage::new(user_id, text))
    }

    /// Push a message to a LINE user (no reply token needed).
    pub async fn push_message(
        api_base: &str,
        access_token: &str,
        to: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if to.is_empty() {
            return Err(ChannelError::Send("push recipient is empty".to_string()).into());
        }

        let url = format!("{}{}", api_base.trim_end_matches('/'), LINE_PUSH_PATH);
        let body = PushRequest {
            to,
            messages: vec![TextMessage::new(text)],
        };

        let resp = client()
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!("LINE push API error: {} {}", status, text);
            return Err(ChannelError::Send(format!("LINE push API error: {status}")).into());
        }

        debug!("LINE push message sent to {}", to);
        Ok(())
    }
}

#[async_trait]
impl Channel for LineChannel {
    fn name(&self) -> &str {
        "line"
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        Self::push_message(
            &self.config.api_base,
            &self.config.channel_access_token,
            &msg.user_id,
            &msg.text,
        )
        .await
    }
}

// ====== LINE Webhook Types ======

#[derive(Debug, Deserialize)]
pub struct LineWebhook {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub events: Vec<LineEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reply_token: Option<String>,
    pub source: Option<LineSource>,
    pub message: Option<LineMessage>,
    pub timestamp: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub user_id: Option<String>,
    pub group_id: Option<String>,
    pub room_id: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMessage {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: Vec<TextMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text }
    }
}

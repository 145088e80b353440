pub mod line;

use async_trait::async_trait;

use crate::types::OutboundMessage;

/// Outbound delivery to a messaging platform.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "line").
    fn name(&self) -> &str;

    /// Send a message through this channel.
    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()>;
}

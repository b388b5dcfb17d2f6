//! Outbound side of the channel: replies and read receipts.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("channel api error: {0}")]
    Api(String),
}

/// Sends messages back through the messaging platform.
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Channel id (e.g. "whatsapp").
    fn id(&self) -> &str;

    /// Send `text` to `to` from the business number `destination`, quoting `reply_to`.
    async fn send_reply(
        &self,
        destination: &str,
        to: &str,
        text: &str,
        reply_to: &str,
    ) -> Result<(), ChannelError>;

    /// Mark the inbound message `message_id` as read.
    async fn mark_read(&self, destination: &str, message_id: &str) -> Result<(), ChannelError>;
}

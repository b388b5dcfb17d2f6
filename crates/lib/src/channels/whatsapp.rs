//! WhatsApp Cloud API channel: send replies and read receipts via the Graph API.

use crate::channels::outbound::{ChannelError, ChannelGateway};
use crate::config::ChannelConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

const MESSAGING_PRODUCT: &str = "whatsapp";

/// Graph API client for the `/{phone_number_id}/messages` endpoint.
#[derive(Clone)]
pub struct WhatsAppChannel {
    id: String,
    api_root: String,
    access_token: String,
    client: reqwest::Client,
}

impl WhatsAppChannel {
    pub fn new(config: &ChannelConfig, access_token: String, timeout: Duration) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            id: "whatsapp".to_string(),
            api_root: graph_api_root(config),
            access_token,
            client,
        })
    }

    async fn post_messages(&self, destination: &str, body: serde_json::Value) -> Result<(), ChannelError> {
        let url = format!("{}/{}/messages", self.api_root, destination);
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api(format!("{} {}", status, body)));
        }
        Ok(())
    }
}

/// `{graphApiBase}/{graphApiVersion}` without a trailing slash.
pub fn graph_api_root(config: &ChannelConfig) -> String {
    format!(
        "{}/{}",
        config.graph_api_base.trim_end_matches('/'),
        config.graph_api_version.trim_matches('/')
    )
}

/// Body for a text reply quoting the inbound message.
pub fn reply_body(to: &str, text: &str, reply_to: &str) -> serde_json::Value {
    json!({
        "messaging_product": MESSAGING_PRODUCT,
        "to": to,
        "text": { "body": text },
        "context": { "message_id": reply_to },
    })
}

/// Body for a read receipt.
pub fn read_body(message_id: &str) -> serde_json::Value {
    json!({
        "messaging_product": MESSAGING_PRODUCT,
        "status": "read",
        "message_id": message_id,
    })
}

#[async_trait]
impl ChannelGateway for WhatsAppChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_reply(
        &self,
        destination: &str,
        to: &str,
        text: &str,
        reply_to: &str,
    ) -> Result<(), ChannelError> {
        self.post_messages(destination, reply_body(to, text, reply_to))
            .await
    }

    async fn mark_read(&self, destination: &str, message_id: &str) -> Result<(), ChannelError> {
        self.post_messages(destination, read_body(message_id)).await
    }
}

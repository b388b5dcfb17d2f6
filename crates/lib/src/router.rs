//! Message router: one inbound event in, history updated and reply actions out.
//!
//! Image: media fetch + vision reply; any failure becomes a fixed apology that is still sent
//! and recorded. Text: the user turn is recorded first, then the model sees the most recent
//! `history_window` turns; on failure nothing is sent and no assistant turn is recorded.
//! Anything else is acknowledged and ignored.

use std::sync::Arc;

use crate::channels::{ChannelGateway, Content, InboundEvent};
use crate::media::{MediaError, MediaSource};
use crate::responder::{Responder, ResponderError};
use crate::session::{ConversationStore, Turn, IMAGE_PLACEHOLDER};

/// Reply sent when the image path fails anywhere.
pub const IMAGE_APOLOGY: &str = "Sorry, I couldn't process that image.";

pub const DEFAULT_HISTORY_WINDOW: usize = 20;

/// Terminal state of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to answer (status callback or unsupported message type).
    AckOnly,
    /// A generated reply was produced and handed to the channel.
    Replied,
    /// The image path failed; the apology was sent instead.
    RepliedWithError,
    /// Text generation failed; no reply was sent, the user turn is kept.
    Unanswered,
}

#[derive(Debug, thiserror::Error)]
enum ImageError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Generation(#[from] ResponderError),
}

/// Orchestrates the store, media fetcher, responder and channel for each event.
pub struct MessageRouter {
    store: Arc<ConversationStore>,
    media: Arc<dyn MediaSource>,
    responder: Arc<Responder>,
    channel: Arc<dyn ChannelGateway>,
    history_window: usize,
}

impl MessageRouter {
    pub fn new(
        store: Arc<ConversationStore>,
        media: Arc<dyn MediaSource>,
        responder: Arc<Responder>,
        channel: Arc<dyn ChannelGateway>,
    ) -> Self {
        Self {
            store,
            media,
            responder,
            channel,
            history_window: DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Process one event to completion. Never fails: errors are logged and folded into the outcome.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let outcome = match &event.content {
            Content::Text(body) => self.handle_text(&event, body).await,
            Content::Image { media_id } => self.handle_image(&event, media_id).await,
            Content::Other(kind) => {
                log::debug!("router: ignoring {} message {}", kind, event.correlation_id);
                Outcome::AckOnly
            }
        };
        log::info!(
            "router: {} message {} from {} -> {:?}",
            event.content.kind(),
            event.correlation_id,
            event.user_id,
            outcome
        );
        outcome
    }

    async fn handle_text(&self, event: &InboundEvent, body: &str) -> Outcome {
        self.store.append(&event.user_id, Turn::user(body)).await;
        let recent = self.store.recent(&event.user_id, self.history_window).await;
        let reply = match self.responder.complete(&recent).await {
            Ok(r) => r,
            Err(e) => {
                log::warn!("router: text reply for {} failed: {}", event.correlation_id, e);
                return Outcome::Unanswered;
            }
        };
        self.store
            .append(&event.user_id, Turn::assistant(reply.clone()))
            .await;
        if !self.send_reply(event, &reply).await {
            return Outcome::Replied;
        }
        if let Err(e) = self
            .channel
            .mark_read(&event.destination, &event.correlation_id)
            .await
        {
            log::warn!("router: mark_read {} failed: {}", event.correlation_id, e);
        }
        Outcome::Replied
    }

    async fn handle_image(&self, event: &InboundEvent, media_id: &str) -> Outcome {
        let (reply, outcome) = match self.describe_image(media_id).await {
            Ok(text) => (text, Outcome::Replied),
            Err(e) => {
                log::warn!("router: image {} for {} failed: {}", media_id, event.correlation_id, e);
                (IMAGE_APOLOGY.to_string(), Outcome::RepliedWithError)
            }
        };
        self.store
            .append(&event.user_id, Turn::user(IMAGE_PLACEHOLDER))
            .await;
        self.store
            .append(&event.user_id, Turn::assistant(reply.clone()))
            .await;
        self.send_reply(event, &reply).await;
        outcome
    }

    async fn describe_image(&self, media_id: &str) -> Result<String, ImageError> {
        let data_uri = self.media.fetch_data_uri(media_id).await?;
        let text = self.responder.describe(&data_uri).await?;
        Ok(text)
    }

    /// False when the channel rejected the reply; the message is then left unread.
    async fn send_reply(&self, event: &InboundEvent, text: &str) -> bool {
        match self
            .channel
            .send_reply(&event.destination, &event.user_id, text, &event.correlation_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "router: {} send_reply {} failed: {}",
                    self.channel.id(),
                    event.correlation_id,
                    e
                );
                false
            }
        }
    }
}

//! Inbound webhook payload and its normalized form.
//!
//! Meta delivers change notifications shaped as
//! `entry[].changes[].value.{metadata, contacts[], messages[], statuses[]}`. Only the first
//! message of the first change is considered; deliveries without a `messages` array (status
//! callbacks, read receipts) normalize to `None`.

use serde::Deserialize;

const DEFAULT_DISPLAY_NAME: &str = "User";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

/// WhatsApp Cloud API webhook POST body.
#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub value: Option<ChangeValue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub messaging_product: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<WaMessage>,
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default)]
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub wa_id: Option<String>,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WaMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub image: Option<MediaRef>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// Opaque media id, resolved later by the media fetcher.
    Image { media_id: String },
    /// Any other message type (audio, sticker, location, ...).
    Other(String),
}

impl Content {
    pub fn kind(&self) -> &str {
        match self {
            Content::Text(_) => "text",
            Content::Image { .. } => "image",
            Content::Other(t) => t.as_str(),
        }
    }
}

/// One normalized inbound message, ready for the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user_id: String,
    pub display_name: String,
    /// Business phone number id that received the message; outbound sends go through it.
    pub destination: String,
    pub content: Content,
    /// Inbound message id; replies quote it and read receipts target it.
    pub correlation_id: String,
}

impl WebhookPayload {
    /// Extract the first message of the first change.
    ///
    /// `Ok(None)` means "nothing to do" (no messages array, e.g. a status callback).
    pub fn normalize(&self) -> Result<Option<InboundEvent>, EventError> {
        let Some(value) = self
            .entry
            .first()
            .and_then(|e| e.changes.first())
            .and_then(|c| c.value.as_ref())
        else {
            return Ok(None);
        };
        let Some(msg) = value.messages.first() else {
            return Ok(None);
        };

        if msg.from.trim().is_empty() {
            return Err(EventError::MalformedEvent("message without sender".into()));
        }
        if msg.id.trim().is_empty() {
            return Err(EventError::MalformedEvent("message without id".into()));
        }
        let destination = value
            .metadata
            .as_ref()
            .map(|m| m.phone_number_id.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EventError::MalformedEvent("missing metadata.phone_number_id".into()))?
            .to_string();

        let content = match msg.message_type.as_str() {
            "text" => {
                let body = msg
                    .text
                    .as_ref()
                    .and_then(|t| t.body.clone())
                    .ok_or_else(|| EventError::MalformedEvent("text message without body".into()))?;
                Content::Text(body)
            }
            "image" => {
                let media_id = msg
                    .image
                    .as_ref()
                    .and_then(|i| i.id.clone())
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| EventError::MalformedEvent("image message without id".into()))?;
                Content::Image { media_id }
            }
            other => Content::Other(other.to_string()),
        };

        let display_name = value
            .contacts
            .first()
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone())
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Ok(Some(InboundEvent {
            user_id: msg.from.clone(),
            display_name,
            destination,
            content,
            correlation_id: msg.id.clone(),
        }))
    }
}

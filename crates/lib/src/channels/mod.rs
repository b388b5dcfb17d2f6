//! Communication channel (WhatsApp Cloud API).
//!
//! Inbound: webhook payloads are normalized into `InboundEvent`s for the router.
//! Outbound: the `ChannelGateway` trait sends replies and read receipts; `WhatsAppChannel`
//! implements it against the Graph API.

mod inbound;
mod outbound;
mod whatsapp;

pub use inbound::{Content, EventError, InboundEvent, WebhookPayload};
pub use outbound::{ChannelError, ChannelGateway};
pub use whatsapp::{graph_api_root, read_body, reply_body, WhatsAppChannel};

//! LLM abstraction and an OpenAI-compatible chat-completions client.
//!
//! Messages carry either plain text or a list of content parts (text and image URLs), which is
//! how vision requests embed an image.

mod openai;

pub use openai::OpenAiClient;

use async_trait::async_trait;
use serde::Serialize;

use crate::session::{Role, Turn};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("llm api error: {0}")]
    Api(String),
    #[error("llm returned no content")]
    EmptyResponse,
}

/// Message content: a string, or typed parts for multimodal input.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One role-tagged message sent to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message with an instruction followed by an image.
    pub fn user_with_image(instruction: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: instruction.into(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        ChatMessage::text(turn.role, turn.content.clone())
    }
}

/// A chat backend: one request, one generated message.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError>;
}

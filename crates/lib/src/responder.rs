//! AI responder: builds chat-completion requests for the two reply modes.
//!
//! Text mode sends the fixed system prompt followed by recent turns. Vision mode sends a single
//! user message with an instruction and the image as a data URI. Backend failures are reported
//! as `GenerationFailed` and the caller picks the fallback; an empty vision answer is replaced
//! by a fixed reply instead.

use std::sync::Arc;

use crate::llm::{ChatMessage, LlmBackend, LlmError};
use crate::session::{Role, Turn};

/// Instruction paired with an image in vision mode.
pub const VISION_INSTRUCTION: &str =
    "Describe this image briefly and respond to any visible text or content.";

/// Reply used when the vision call succeeds but carries no text.
pub const VISION_EMPTY_REPLY: &str = "I couldn't analyze this image properly.";

#[derive(Debug, thiserror::Error)]
pub enum ResponderError {
    #[error("generation failed: {0}")]
    GenerationFailed(#[from] LlmError),
}

/// Persona prompt with the given date embedded.
pub fn system_prompt(today: &str) -> String {
    format!(
        "You are a helpful virtual assistant for WhatsApp users. The current date is {today}.

Guidelines for your responses:
- Be concise, friendly, and conversational
- When users ask questions, provide accurate and helpful information
- If you don't know something, be honest about it
- Remember that you're representing the brand, so maintain a professional tone
- Each message should be self-contained and clear
- Keep responses short and to the point - WhatsApp is a messaging platform

You can help users with:
- Answering questions about products or services
- Providing general information
- Assisting with basic troubleshooting
- Directing users to resources

If you detect that a user needs human assistance, politely let them know that you'll connect them with a human agent soon."
    )
}

/// Produces assistant replies from conversation turns or an image.
pub struct Responder {
    backend: Arc<dyn LlmBackend>,
    model: String,
    vision_model: String,
    system_prompt: String,
}

impl Responder {
    /// The system prompt is fixed for the process lifetime; the date is taken once here.
    pub fn new(backend: Arc<dyn LlmBackend>, model: impl Into<String>, vision_model: impl Into<String>) -> Self {
        let today = chrono::Local::now().format("%Y-%m-%d").to_string();
        Self::with_system_prompt(backend, model, vision_model, system_prompt(&today))
    }

    pub fn with_system_prompt(
        backend: Arc<dyn LlmBackend>,
        model: impl Into<String>,
        vision_model: impl Into<String>,
        system_prompt: String,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            vision_model: vision_model.into(),
            system_prompt,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Request for text mode: system prompt first, then the turns in order.
    pub fn text_request(&self, turns: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::text(Role::System, self.system_prompt.clone()));
        messages.extend(turns.iter().map(ChatMessage::from));
        messages
    }

    /// Request for vision mode: one user message, instruction then image.
    pub fn vision_request(&self, image_data_uri: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user_with_image(VISION_INSTRUCTION, image_data_uri)]
    }

    /// Text mode.
    pub async fn complete(&self, turns: &[Turn]) -> Result<String, ResponderError> {
        log::debug!("responder: text request with {} turn(s) on {}", turns.len(), self.model);
        let reply = self.backend.chat(&self.model, self.text_request(turns)).await?;
        Ok(reply)
    }

    /// Vision mode. An empty answer is not a failure here; it yields `VISION_EMPTY_REPLY`.
    pub async fn describe(&self, image_data_uri: &str) -> Result<String, ResponderError> {
        log::debug!("responder: vision request on {}", self.vision_model);
        match self
            .backend
            .chat(&self.vision_model, self.vision_request(image_data_uri))
            .await
        {
            Ok(reply) => Ok(reply),
            Err(LlmError::EmptyResponse) => {
                log::warn!("responder: vision reply had no content");
                Ok(VISION_EMPTY_REPLY.to_string())
            }
            Err(e) => Err(e.into()),
        }
    }
}

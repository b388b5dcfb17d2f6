//! Relay core library: a WhatsApp Business webhook gateway that answers users with a
//! generative-AI backend, keeping per-user conversation history in memory.

pub mod channels;
pub mod config;
pub mod dispatch;
pub mod gateway;
pub mod init;
pub mod llm;
pub mod media;
pub mod responder;
pub mod router;
pub mod session;

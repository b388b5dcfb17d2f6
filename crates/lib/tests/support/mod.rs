//! Shared fakes for router, dispatcher and gateway tests.
#![allow(dead_code)]

use async_trait::async_trait;
use relay::channels::{ChannelError, ChannelGateway, Content, InboundEvent};
use relay::llm::{ChatMessage, LlmBackend, LlmError};
use relay::media::{MediaError, MediaPayload, MediaSource, ResolvedMedia};
use relay::responder::Responder;
use relay::router::MessageRouter;
use relay::session::ConversationStore;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SYSTEM: &str = "SYS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Reply {
        destination: String,
        to: String,
        text: String,
        reply_to: String,
    },
    Read {
        destination: String,
        message_id: String,
    },
}

/// Channel that records every outbound action.
#[derive(Default)]
pub struct RecordingChannel {
    pub sent: Mutex<Vec<Sent>>,
    pub fail: bool,
}

impl RecordingChannel {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelGateway for RecordingChannel {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send_reply(
        &self,
        destination: &str,
        to: &str,
        text: &str,
        reply_to: &str,
    ) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Reply {
            destination: destination.into(),
            to: to.into(),
            text: text.into(),
            reply_to: reply_to.into(),
        });
        if self.fail {
            return Err(ChannelError::Api("503 unavailable".into()));
        }
        Ok(())
    }

    async fn mark_read(&self, destination: &str, message_id: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent::Read {
            destination: destination.into(),
            message_id: message_id.into(),
        });
        if self.fail {
            return Err(ChannelError::Api("503 unavailable".into()));
        }
        Ok(())
    }
}

/// Backend returning scripted replies; once the script runs out it answers "reply N".
#[derive(Default)]
pub struct ScriptedBackend {
    pub replies: Mutex<VecDeque<Result<String, String>>>,
    pub delays: Mutex<VecDeque<Duration>>,
    pub requests: Mutex<Vec<(String, Vec<ChatMessage>)>>,
}

impl ScriptedBackend {
    pub fn with_replies(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    pub fn requests(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn chat(&self, model: &str, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push((model.to_string(), messages));
            requests.len()
        };
        let scripted = self.replies.lock().unwrap().pop_front();
        match scripted {
            Some(Ok(text)) => Ok(text),
            Some(Err(e)) => Err(LlmError::Api(e)),
            None => Ok(format!("reply {}", n)),
        }
    }
}

/// Media source that serves fixed bytes, or fails at resolution.
pub struct FakeMedia {
    pub payload: Option<MediaPayload>,
    pub resolved: Mutex<Vec<String>>,
}

impl FakeMedia {
    pub fn serving(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            payload: Some(MediaPayload {
                mime_type: mime_type.into(),
                bytes: bytes.to_vec(),
            }),
            resolved: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            payload: None,
            resolved: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MediaSource for FakeMedia {
    async fn resolve(&self, media_id: &str) -> Result<ResolvedMedia, MediaError> {
        self.resolved.lock().unwrap().push(media_id.to_string());
        match self.payload {
            Some(ref p) => Ok(ResolvedMedia {
                url: format!("https://cdn.test/{}", media_id),
                mime_type: p.mime_type.clone(),
            }),
            None => Err(MediaError::MediaUnavailable("404 Not Found".into())),
        }
    }

    async fn download(&self, _media: &ResolvedMedia) -> Result<MediaPayload, MediaError> {
        self.payload
            .clone()
            .ok_or_else(|| MediaError::MediaUnavailable("gone".into()))
    }
}

pub struct Harness {
    pub store: Arc<ConversationStore>,
    pub backend: Arc<ScriptedBackend>,
    pub media: Arc<FakeMedia>,
    pub channel: Arc<RecordingChannel>,
    pub router: Arc<MessageRouter>,
}

pub fn harness(backend: ScriptedBackend, media: FakeMedia, channel: RecordingChannel) -> Harness {
    let store = Arc::new(ConversationStore::new());
    let backend = Arc::new(backend);
    let media = Arc::new(media);
    let channel = Arc::new(channel);
    let responder = Arc::new(Responder::with_system_prompt(
        backend.clone(),
        "text-model",
        "vision-model",
        SYSTEM.to_string(),
    ));
    let router = Arc::new(MessageRouter::new(
        store.clone(),
        media.clone(),
        responder,
        channel.clone(),
    ));
    Harness {
        store,
        backend,
        media,
        channel,
        router,
    }
}

pub fn default_harness() -> Harness {
    harness(
        ScriptedBackend::default(),
        FakeMedia::serving("image/png", &[1, 2, 3]),
        RecordingChannel::default(),
    )
}

pub fn text_event(user: &str, id: &str, body: &str) -> InboundEvent {
    InboundEvent {
        user_id: user.into(),
        display_name: "User".into(),
        destination: "PN1".into(),
        content: Content::Text(body.into()),
        correlation_id: id.into(),
    }
}

pub fn image_event(user: &str, id: &str, media_id: &str) -> InboundEvent {
    InboundEvent {
        content: Content::Image {
            media_id: media_id.into(),
        },
        ..text_event(user, id, "")
    }
}

/// Serve an axum app on an ephemeral port; returns `http://127.0.0.1:port`.
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener address should resolve");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server should run");
    });
    format!("http://{}", addr)
}

//! Gateway HTTP server: webhook verification and delivery, info page, health.

use crate::channels::{ChannelGateway, WebhookPayload, WhatsAppChannel};
use crate::config::{self, Config};
use crate::dispatch::Dispatcher;
use crate::llm::{LlmBackend, OpenAiClient};
use crate::media::{GraphMediaFetcher, MediaSource};
use crate::responder::Responder;
use crate::router::MessageRouter;
use crate::session::ConversationStore;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const INFO_PAGE: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>WhatsApp AI relay</title></head>
<body>
<pre>
====================================
WhatsApp AI relay
====================================

This server relays WhatsApp Business messages to a generative-AI backend:
- text messages are answered with the recent conversation as context
- images are described and answered

To get started:
1. Set WEBHOOK_VERIFY_TOKEN, GRAPH_API_TOKEN and OPENAI_API_KEY
2. Point your WhatsApp Business webhook at /webhook
3. Verify the webhook from the Meta developer console
</pre>
</body>
</html>
"#;

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Expected `hub.verify_token` for subscription verification.
    pub verify_token: Arc<str>,
    pub dispatcher: Dispatcher,
}

impl GatewayState {
    pub fn new(verify_token: impl Into<Arc<str>>, dispatcher: Dispatcher) -> Self {
        Self {
            verify_token: verify_token.into(),
            dispatcher,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        self.dispatcher.router().store()
    }
}

/// Build the router, store and real HTTP clients from a resolved config (env overrides applied).
pub fn build_state(config: &Config) -> Result<GatewayState> {
    config::require_credentials(config)?;
    // require_credentials guarantees these are present
    let verify_token = config.channel.verify_token.clone().unwrap_or_default();
    let access_token = config.channel.access_token.clone().unwrap_or_default();
    let api_key = config.ai.api_key.clone().unwrap_or_default();
    let timeout = config.timeouts.request();

    let channel: Arc<dyn ChannelGateway> = Arc::new(
        WhatsAppChannel::new(&config.channel, access_token.clone(), timeout)
            .context("building whatsapp client")?,
    );
    let media: Arc<dyn MediaSource> = Arc::new(
        GraphMediaFetcher::new(&config.channel, access_token, timeout)
            .context("building media client")?,
    );
    let backend: Arc<dyn LlmBackend> = Arc::new(
        OpenAiClient::new(Some(config.ai.base_url.clone()), api_key, timeout)
            .context("building ai client")?,
    );
    let responder = Arc::new(Responder::new(
        backend,
        config.ai.model.clone(),
        config.ai.vision_model().to_string(),
    ));
    let store = Arc::new(ConversationStore::with_retention(
        config.conversation.retention(),
    ));
    let router = MessageRouter::new(store, media, responder, channel)
        .with_history_window(config.conversation.history_window);
    Ok(GatewayState::new(verify_token, Dispatcher::new(Arc::new(router))))
}

/// HTTP routes.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(info_page))
        .route("/health", get(health_http))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state)
}

/// Run the gateway; binds to config.gateway.bind:config.gateway.port.
/// Expects env overrides already applied. Blocks until shutdown (e.g. Ctrl+C).
pub async fn run_gateway(config: Config) -> Result<()> {
    let state = build_state(&config)?;

    let sweeper = spawn_retention_sweeper(
        state.store().clone(),
        config.conversation.sweep_interval(),
    );

    let bind_addr = format!("{}:{}", config.gateway.bind.trim(), config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("gateway server exited")?;
    if let Some(handle) = sweeper {
        handle.abort();
    }
    log::info!("gateway stopped");
    Ok(())
}

/// Periodically forget idle users. None when the store has no idle TTL.
fn spawn_retention_sweeper(
    store: Arc<ConversationStore>,
    every: Duration,
) -> Option<tokio::task::JoinHandle<()>> {
    store.retention().idle_ttl?;
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle().await;
            if evicted > 0 {
                log::info!("retention: evicted {} idle conversation(s)", evicted);
            }
        }
    }))
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// `Some(challenge)` when mode is `subscribe` and the token matches.
pub fn verify_subscription(params: &VerifyParams, expected_token: &str) -> Option<String> {
    let mode = params.mode.as_deref()?;
    let token = params.verify_token.as_deref()?;
    let challenge = params.challenge.as_deref()?;
    if mode == "subscribe" && !expected_token.is_empty() && token == expected_token {
        Some(challenge.to_string())
    } else {
        None
    }
}

/// GET /webhook: Meta subscription verification. Echoes hub.challenge or 403.
async fn verify_webhook(
    State(state): State<GatewayState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match verify_subscription(&params, &state.verify_token) {
        Some(challenge) => {
            log::info!("webhook: verified subscription");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            log::warn!("webhook: verification rejected (mode {:?})", params.mode);
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook: always 200. Messages are queued for the per-user workers.
async fn receive_webhook(State(state): State<GatewayState>, body: Bytes) -> StatusCode {
    log::debug!("webhook: incoming {}", String::from_utf8_lossy(&body));
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("webhook: dropping unparseable body: {}", e);
            return StatusCode::OK;
        }
    };
    match payload.normalize() {
        Ok(Some(event)) => state.dispatcher.submit(event).await,
        Ok(None) => log::debug!("webhook: non-message event, skipping"),
        Err(e) => log::warn!("webhook: dropping event: {}", e),
    }
    StatusCode::OK
}

/// GET /: static informational page.
async fn info_page() -> Html<&'static str> {
    Html(INFO_PAGE)
}

/// GET /health: liveness plus tracked conversation count.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "users": state.store().len().await,
        "workers": state.dispatcher.active_workers().await,
    }))
}

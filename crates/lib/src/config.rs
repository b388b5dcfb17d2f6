//! Configuration types and loading.
//!
//! Config is loaded from an optional JSON file (e.g. `~/.relay/config.json`) and the
//! environment. The four recognized environment variables (`WEBHOOK_VERIFY_TOKEN`,
//! `GRAPH_API_TOKEN`, `OPENAI_API_KEY`, `PORT`) override the file when set and non-blank.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session::RetentionPolicy;

pub const ENV_VERIFY_TOKEN: &str = "WEBHOOK_VERIFY_TOKEN";
pub const ENV_GRAPH_API_TOKEN: &str = "GRAPH_API_TOKEN";
pub const ENV_AI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_PORT: &str = "PORT";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// WhatsApp Cloud API settings (verify token, bearer token, Graph API base).
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Generative-AI backend settings.
    #[serde(default)]
    pub ai: AiConfig,

    /// Conversation window and retention.
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Deadlines for outbound calls.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Listen port (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the Graph API must be able to reach the webhook).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// WhatsApp channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Secret echoed back by Meta during webhook verification. Overridden by WEBHOOK_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    /// Bearer token for the Graph API (sending, read receipts, media). Overridden by GRAPH_API_TOKEN env.
    pub access_token: Option<String>,
    #[serde(default = "default_graph_api_base")]
    pub graph_api_base: String,
    #[serde(default = "default_graph_api_version")]
    pub graph_api_version: String,
}

fn default_graph_api_base() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_graph_api_version() -> String {
    "v18.0".to_string()
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            access_token: None,
            graph_api_base: default_graph_api_base(),
            graph_api_version: default_graph_api_version(),
        }
    }
}

/// AI backend config (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    /// API key. Overridden by OPENAI_API_KEY env.
    pub api_key: Option<String>,
    #[serde(default = "default_ai_base_url")]
    pub base_url: String,
    #[serde(default = "default_ai_model")]
    pub model: String,
    /// Model used for image requests. Falls back to `model` when unset.
    #[serde(default)]
    pub vision_model: Option<String>,
}

fn default_ai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_ai_model() -> String {
    "gpt-4.1".to_string()
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_ai_base_url(),
            model: default_ai_model(),
            vision_model: None,
        }
    }
}

impl AiConfig {
    pub fn vision_model(&self) -> &str {
        self.vision_model
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.model)
    }
}

/// Conversation window and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationConfig {
    /// Number of most recent turns sent to the model on the text path (default 20).
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Hard cap on stored turns per user; oldest dropped first. 0 = unbounded.
    #[serde(default = "default_max_turns_per_user")]
    pub max_turns_per_user: usize,
    /// Users idle longer than this are evicted by the sweeper. 0 = never.
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_history_window() -> usize {
    20
}

fn default_max_turns_per_user() -> usize {
    200
}

fn default_idle_ttl_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            max_turns_per_user: default_max_turns_per_user(),
            idle_ttl_secs: default_idle_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ConversationConfig {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            max_turns_per_user: (self.max_turns_per_user > 0).then_some(self.max_turns_per_user),
            idle_ttl: (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs)),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Outbound call deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutsConfig {
    /// Applied to every media, AI and channel request (default 30).
    #[serde(default = "default_request_secs")]
    pub request_secs: u64,
}

fn default_request_secs() -> u64 {
    30
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            request_secs: default_request_secs(),
        }
    }
}

impl TimeoutsConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs.max(1))
    }
}

/// Non-blank, trimmed value of an env var.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_blank(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the webhook verify token: env WEBHOOK_VERIFY_TOKEN overrides config.
pub fn resolve_verify_token(config: &Config) -> Option<String> {
    env_value(ENV_VERIFY_TOKEN).or_else(|| non_blank(config.channel.verify_token.as_ref()))
}

/// Resolve the Graph API bearer token: env GRAPH_API_TOKEN overrides config.
pub fn resolve_access_token(config: &Config) -> Option<String> {
    env_value(ENV_GRAPH_API_TOKEN).or_else(|| non_blank(config.channel.access_token.as_ref()))
}

/// Resolve the AI credential: env OPENAI_API_KEY overrides config.
pub fn resolve_ai_api_key(config: &Config) -> Option<String> {
    env_value(ENV_AI_API_KEY).or_else(|| non_blank(config.ai.api_key.as_ref()))
}

/// Resolve the listen port: env PORT overrides config. An unparseable PORT is ignored with a warning.
pub fn resolve_port(config: &Config) -> u16 {
    match env_value(ENV_PORT) {
        Some(p) => match p.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                log::warn!("config: ignoring invalid {}={}", ENV_PORT, p);
                config.gateway.port
            }
        },
        None => config.gateway.port,
    }
}

/// Apply every env override to the config in place, so downstream code reads one source.
pub fn apply_env_overrides(config: &mut Config) {
    config.channel.verify_token = resolve_verify_token(config);
    config.channel.access_token = resolve_access_token(config);
    config.ai.api_key = resolve_ai_api_key(config);
    config.gateway.port = resolve_port(config);
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or RELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

/// Fail fast when a credential the relay cannot run without is missing.
pub fn require_credentials(config: &Config) -> Result<()> {
    if non_blank(config.channel.verify_token.as_ref()).is_none() {
        anyhow::bail!(
            "missing webhook verify token (set {} or channel.verifyToken)",
            ENV_VERIFY_TOKEN
        );
    }
    if non_blank(config.channel.access_token.as_ref()).is_none() {
        anyhow::bail!(
            "missing Graph API token (set {} or channel.accessToken)",
            ENV_GRAPH_API_TOKEN
        );
    }
    if non_blank(config.ai.api_key.as_ref()).is_none() {
        anyhow::bail!(
            "missing AI credential (set {} or ai.apiKey)",
            ENV_AI_API_KEY
        );
    }
    Ok(())
}

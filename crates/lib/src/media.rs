//! Media fetcher: resolve a WhatsApp media id to a URL, download it, and wrap the bytes as a
//! `data:` URI so the AI backend never sees Graph API addressing.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::channels::graph_api_root;
use crate::config::ChannelConfig;

/// Every failure in the resolve/download chain surfaces as this one kind.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media unavailable: {0}")]
    MediaUnavailable(String),
}

impl From<reqwest::Error> for MediaError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            MediaError::MediaUnavailable("request timed out".to_string())
        } else {
            MediaError::MediaUnavailable(e.to_string())
        }
    }
}

/// Resolution result for a media id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMedia {
    pub url: String,
    pub mime_type: String,
}

/// Downloaded media bytes plus content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPayload {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaPayload {
    /// `data:{mime};base64,{payload}`.
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Source of media bytes for an opaque media reference.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn resolve(&self, media_id: &str) -> Result<ResolvedMedia, MediaError>;

    async fn download(&self, media: &ResolvedMedia) -> Result<MediaPayload, MediaError>;

    /// Resolve, download and encode as a data URI.
    async fn fetch_data_uri(&self, media_id: &str) -> Result<String, MediaError> {
        let resolved = self.resolve(media_id).await?;
        let payload = self.download(&resolved).await?;
        Ok(payload.to_data_uri())
    }
}

#[derive(Debug, Deserialize)]
struct MediaMetaResponse {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

/// Graph API media client (bearer-authenticated for both calls).
#[derive(Clone)]
pub struct GraphMediaFetcher {
    api_root: String,
    access_token: String,
    client: reqwest::Client,
}

impl GraphMediaFetcher {
    pub fn new(config: &ChannelConfig, access_token: String, timeout: Duration) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            api_root: graph_api_root(config),
            access_token,
            client,
        })
    }
}

#[async_trait]
impl MediaSource for GraphMediaFetcher {
    /// GET /{media_id}?fields=url,mime_type
    async fn resolve(&self, media_id: &str) -> Result<ResolvedMedia, MediaError> {
        let url = format!("{}/{}", self.api_root, media_id);
        let res = self
            .client
            .get(&url)
            .query(&[("fields", "url,mime_type")])
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MediaError::MediaUnavailable(format!("resolve {} {}", status, body)));
        }
        let meta: MediaMetaResponse = res.json().await?;
        let url = meta
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| MediaError::MediaUnavailable("resolution missing url".to_string()))?;
        let mime_type = meta
            .mime_type
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| MediaError::MediaUnavailable("resolution missing mime_type".to_string()))?;
        Ok(ResolvedMedia { url, mime_type })
    }

    async fn download(&self, media: &ResolvedMedia) -> Result<MediaPayload, MediaError> {
        let res = self
            .client
            .get(&media.url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(MediaError::MediaUnavailable(format!("download {}", res.status())));
        }
        let bytes = res.bytes().await?;
        if bytes.is_empty() {
            return Err(MediaError::MediaUnavailable("empty download".to_string()));
        }
        Ok(MediaPayload {
            mime_type: media.mime_type.clone(),
            bytes: bytes.to_vec(),
        })
    }
}

//! Conversation store: per-user ordered turn history.
//!
//! Keyed by the channel's user id (the sender's phone number). Turns are only ever appended;
//! the retention policy may drop the oldest turns of a user or forget idle users entirely.
//! Nothing survives a process restart.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Opaque external user identifier.
pub type UserId = String;

/// Placeholder content recorded for an image the user sent.
pub const IMAGE_PLACEHOLDER: &str = "[Image sent]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// A single turn (role + content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// How much history the store keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Oldest turns beyond this count are dropped on append. None = unbounded.
    pub max_turns_per_user: Option<usize>,
    /// Users with no append for this long are removed by `evict_idle`. None = never.
    pub idle_ttl: Option<Duration>,
}

#[derive(Debug)]
struct Conversation {
    turns: VecDeque<Turn>,
    last_active: Instant,
}

/// In-memory store for conversations (append, recent, evict).
pub struct ConversationStore {
    inner: Arc<RwLock<HashMap<UserId, Conversation>>>,
    retention: RetentionPolicy,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Store with no retention limits.
    pub fn new() -> Self {
        Self::with_retention(RetentionPolicy::default())
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Append a turn, creating the conversation on first use.
    pub async fn append(&self, user_id: &str, turn: Turn) {
        let mut g = self.inner.write().await;
        let conv = g.entry(user_id.to_string()).or_insert_with(|| Conversation {
            turns: VecDeque::new(),
            last_active: Instant::now(),
        });
        conv.turns.push_back(turn);
        conv.last_active = Instant::now();
        if let Some(max) = self.retention.max_turns_per_user {
            while conv.turns.len() > max {
                conv.turns.pop_front();
            }
        }
    }

    /// The most recent `limit` turns in original order (fewer when history is shorter).
    /// Unknown users yield an empty history.
    pub async fn recent(&self, user_id: &str, limit: usize) -> Vec<Turn> {
        let g = self.inner.read().await;
        match g.get(user_id) {
            Some(conv) => {
                let skip = conv.turns.len().saturating_sub(limit);
                conv.turns.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    /// Full history for a user (oldest first).
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        self.recent(user_id, usize::MAX).await
    }

    /// Number of users currently tracked.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Remove users whose last append is older than the idle TTL. Returns how many were removed.
    pub async fn evict_idle(&self) -> usize {
        let Some(ttl) = self.retention.idle_ttl else {
            return 0;
        };
        let mut g = self.inner.write().await;
        let before = g.len();
        g.retain(|_, conv| conv.last_active.elapsed() < ttl);
        before - g.len()
    }
}

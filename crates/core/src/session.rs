//! Session to task binding.
//!
//! A session tracks at most one task. Binding a new task replaces the old
//! binding without affecting the old task's execution.
//!
//! Bindings expire with the session token that owns them, so the in-memory
//! store forgets a binding once its TTL has passed since it was last set.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use crate::task_id::TaskId;

/// Opaque session identifier carried in the client's session token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current(&self, session: &SessionId) -> Option<TaskId>;

    /// Bind `task_id`, returning the previous binding if any.
    async fn bind(&self, session: &SessionId, task_id: TaskId) -> Option<TaskId>;

    /// Forget the binding, returning it if there was one.
    async fn clear(&self, session: &SessionId) -> Option<TaskId>;
}

#[derive(Debug)]
struct Binding {
    task_id: TaskId,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct InMemorySessionStore {
    ttl: Duration,
    bindings: RwLock<HashMap<SessionId, Binding>>,
}

impl InMemorySessionStore {
    /// `ttl` should match the session token lifetime.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            bindings: RwLock::default(),
        }
    }

    /// Number of stored bindings, expired ones included until the next sweep.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn current(&self, session: &SessionId) -> Option<TaskId> {
        self.bindings
            .read()
            .await
            .get(session)
            .filter(|b| b.expires_at > Instant::now())
            .map(|b| b.task_id.clone())
    }

    async fn bind(&self, session: &SessionId, task_id: TaskId) -> Option<TaskId> {
        let now = Instant::now();
        let mut bindings = self.bindings.write().await;

        let previous = bindings
            .remove(session)
            .filter(|b| b.expires_at > now)
            .map(|b| b.task_id);

        let before = bindings.len();
        bindings.retain(|_, b| b.expires_at > now);
        let evicted = before - bindings.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Evicted expired session bindings");
        }

        bindings.insert(
            session.clone(),
            Binding {
                task_id,
                expires_at: now + self.ttl,
            },
        );
        previous
    }

    async fn clear(&self, session: &SessionId) -> Option<TaskId> {
        self.bindings
            .write()
            .await
            .remove(session)
            .filter(|b| b.expires_at > Instant::now())
            .map(|b| b.task_id)
    }
}

//! Storage trait definitions for HelixRun sessions
//!
//! - `SessionStore`: conversation sessions keyed by `(app, user, session)`
//!
//! The trait is async and backend-agnostic. An in-memory implementation is
//! provided in the `memory` module.
//!
//! # Concurrency contract
//!
//! Distinct session keys never contend with each other. Callers that need
//! exclusive access to one session for the duration of a run acquire a
//! [`SessionLease`] via [`SessionStore::lock`]; a second lock request for the
//! same key waits until the first lease is dropped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;

use crate::error::StoreError;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identity of one session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(
        app_name: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }

    /// Reject keys with empty components.
    pub fn validate(&self) -> StoreResult<()> {
        if self.app_name.is_empty() {
            return Err(StoreError::InvalidKey("app_name is empty".to_string()));
        }
        if self.user_id.is_empty() {
            return Err(StoreError::InvalidKey("user_id is empty".to_string()));
        }
        if self.session_id.is_empty() {
            return Err(StoreError::InvalidKey("session_id is empty".to_string()));
        }
        Ok(())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.app_name, self.user_id, self.session_id)
    }
}

/// Generate a fresh session id.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ---------------------------------------------------------------------------
// Session records
// ---------------------------------------------------------------------------

/// Speaker of a recorded turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One completed conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: TurnRole,
    /// Agent id for assistant turns, user id for user turns.
    pub author: String,
    pub content: String,
    /// Invocation that produced this turn.
    pub invocation_id: String,
    pub timestamp: DateTime<Utc>,
}

impl SessionTurn {
    pub fn user(
        author: impl Into<String>,
        content: impl Into<String>,
        invocation_id: impl Into<String>,
    ) -> Self {
        Self {
            role: TurnRole::User,
            author: author.into(),
            content: content.into(),
            invocation_id: invocation_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(
        author: impl Into<String>,
        content: impl Into<String>,
        invocation_id: impl Into<String>,
    ) -> Self {
        Self {
            role: TurnRole::Assistant,
            author: author.into(),
            content: content.into(),
            invocation_id: invocation_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A conversation session and its turn history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,
    pub turns: Vec<SessionTurn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.key.session_id
    }
}

/// Exclusive access to one session, released on drop.
#[derive(Debug)]
pub struct SessionLease {
    key: SessionKey,
    _guard: OwnedMutexGuard<()>,
}

impl SessionLease {
    pub fn new(key: SessionKey, guard: OwnedMutexGuard<()>) -> Self {
        Self { key, _guard: guard }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Session persistence.
///
/// Guarantees:
/// - `get_or_create` with `None` always creates a new session with a
///   generated id; with `Some(id)` it returns the existing session or creates
///   one under that id.
/// - `append_turns` preserves insertion order.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a session for `(app, user, session_id)`, creating it if absent.
    async fn get_or_create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> StoreResult<Session>;

    /// Snapshot of a session. Returns `StoreError::SessionNotFound` if absent.
    async fn get(&self, key: &SessionKey) -> StoreResult<Session>;

    /// All sessions for a user, ordered by session id.
    async fn list(&self, app_name: &str, user_id: &str) -> StoreResult<Vec<SessionKey>>;

    /// Append turns to a session's history.
    async fn append_turns(&self, key: &SessionKey, turns: Vec<SessionTurn>) -> StoreResult<()>;

    /// Delete a session. No-op if absent.
    async fn delete(&self, key: &SessionKey) -> StoreResult<()>;

    /// Wait for exclusive access to a session.
    async fn lock(&self, key: &SessionKey) -> StoreResult<SessionLease>;
}

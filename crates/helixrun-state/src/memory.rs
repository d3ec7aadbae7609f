//! In-memory session store
//!
//! Process-wide, not persisted. Each session carries its own lock so that
//! leases on different sessions never contend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::StoreError;
use crate::storage_traits::*;

#[derive(Debug)]
struct SessionEntry {
    session: Session,
    lock: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn new(key: SessionKey) -> Self {
        Self {
            session: Session::new(key),
            lock: Arc::new(Mutex::new(())),
        }
    }
}

/// In-memory session store backed by a `HashMap<SessionKey, SessionEntry>`.
///
/// Nothing is evicted: every `get_or_create` without a session id adds an
/// entry that lives until [`SessionStore::delete`] or process exit.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, SessionEntry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

fn not_found(key: &SessionKey) -> StoreError {
    StoreError::SessionNotFound {
        key: key.to_string(),
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: Option<&str>,
    ) -> StoreResult<Session> {
        let session_id = match session_id {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => new_session_id(),
        };
        let key = SessionKey::new(app_name, user_id, session_id);
        key.validate()?;

        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(key.clone()).or_insert_with(|| {
            debug!(session = %key, "creating session");
            SessionEntry::new(key)
        });
        Ok(entry.session.clone())
    }

    async fn get(&self, key: &SessionKey) -> StoreResult<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .map(|e| e.session.clone())
            .ok_or_else(|| not_found(key))
    }

    async fn list(&self, app_name: &str, user_id: &str) -> StoreResult<Vec<SessionKey>> {
        let sessions = self.sessions.read().await;
        let mut keys: Vec<SessionKey> = sessions
            .keys()
            .filter(|k| k.app_name == app_name && k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn append_turns(&self, key: &SessionKey, turns: Vec<SessionTurn>) -> StoreResult<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(key).ok_or_else(|| not_found(key))?;
        entry.session.turns.extend(turns);
        entry.session.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, key: &SessionKey) -> StoreResult<()> {
        self.sessions.write().await.remove(key);
        Ok(())
    }

    async fn lock(&self, key: &SessionKey) -> StoreResult<SessionLease> {
        // Clone the lock out so the map guard is released before waiting.
        let lock = {
            let sessions = self.sessions.read().await;
            let entry = sessions.get(key).ok_or_else(|| not_found(key))?;
            Arc::clone(&entry.lock)
        };
        let guard = lock.lock_owned().await;
        Ok(SessionLease::new(key.clone(), guard))
    }
}

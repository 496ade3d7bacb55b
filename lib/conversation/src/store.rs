//! In-memory session store.

use crate::error::SessionError;
use crate::message::Message;
use crate::session::{Session, SessionManager};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use derek_core::ConversationSessionId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_IDLE_TTL_MINUTES: u64 = 60;
const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Lifecycle limits for an [`InMemorySessionStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStoreConfig {
    /// How long a session may sit idle before it is considered expired.
    pub idle_ttl: Duration,
    /// Maximum number of sessions kept alongside the default session.
    pub max_sessions: usize,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            idle_ttl: Duration::from_secs(DEFAULT_IDLE_TTL_MINUTES * 60),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

/// Session store backed by a `HashMap` behind an async `RwLock`.
///
/// A pinned default session is created up front. Creating a session past
/// `max_sessions` evicts the least recently active unpinned one.
#[derive(Debug)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ConversationSessionId, Session>>,
    default_id: ConversationSessionId,
    config: SessionStoreConfig,
}

impl InMemorySessionStore {
    /// Creates a store holding only the default session.
    #[must_use]
    pub fn new(config: SessionStoreConfig) -> Self {
        let default_session = Session::pinned();
        let default_id = default_session.id;
        Self {
            sessions: RwLock::new(HashMap::from([(default_id, default_session)])),
            default_id,
            config,
        }
    }

    /// Number of sessions currently held, the default session included.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// The activity cutoff for the TTL; `None` if the TTL reaches past the
    /// representable range, in which case nothing expires.
    fn expiry_cutoff(&self) -> Option<DateTime<Utc>> {
        let ttl = TimeDelta::from_std(self.config.idle_ttl).ok()?;
        Utc::now().checked_sub_signed(ttl)
    }

    fn evict_least_recently_active(sessions: &mut HashMap<ConversationSessionId, Session>) {
        let oldest = sessions
            .values()
            .filter(|s| !s.pinned)
            .min_by_key(|s| s.last_active_at)
            .map(|s| s.id);

        if let Some(id) = oldest {
            sessions.remove(&id);
            tracing::info!(session_id = %id, "Evicted least recently active session");
        }
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

#[async_trait]
impl SessionManager for InMemorySessionStore {
    async fn create_session(&self) -> Result<Session, SessionError> {
        let session = Session::new();
        let mut sessions = self.sessions.write().await;

        let limit = self.config.max_sessions.max(1);
        while sessions.values().filter(|s| !s.pinned).count() >= limit {
            Self::evict_least_recently_active(&mut sessions);
        }

        sessions.insert(session.id, session.clone());
        tracing::debug!(session_id = %session.id, total = sessions.len(), "Created session");
        Ok(session)
    }

    async fn get_session(&self, id: ConversationSessionId) -> Result<Session, SessionError> {
        let sessions = self.sessions.read().await;
        let session = sessions.get(&id).ok_or(SessionError::NotFound { id })?;

        if self
            .expiry_cutoff()
            .is_some_and(|cutoff| session.is_idle_since(cutoff))
        {
            return Err(SessionError::Expired { id });
        }

        Ok(session.clone())
    }

    fn default_session_id(&self) -> ConversationSessionId {
        self.default_id
    }

    async fn append_turn(
        &self,
        id: ConversationSessionId,
        user: Message,
        assistant: Message,
    ) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound { id })?;
        session.append_turn(user, assistant);
        Ok(())
    }

    async fn clear_messages(&self, id: ConversationSessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(SessionError::NotFound { id })?;
        session.clear_messages();
        Ok(())
    }

    async fn delete_session(&self, id: ConversationSessionId) -> Result<(), SessionError> {
        if id == self.default_id {
            return Err(SessionError::Pinned { id });
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .remove(&id)
            .map(|_| ())
            .ok_or(SessionError::NotFound { id })
    }

    async fn get_expired_sessions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<ConversationSessionId>, SessionError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|s| s.is_idle_since(older_than))
            .map(|s| s.id)
            .collect())
    }

    async fn evict_expired(&self) -> Result<Vec<ConversationSessionId>, SessionError> {
        let Some(cutoff) = self.expiry_cutoff() else {
            return Ok(Vec::new());
        };

        let mut sessions = self.sessions.write().await;
        let expired: Vec<_> = sessions
            .values()
            .filter(|s| s.is_idle_since(cutoff))
            .map(|s| s.id)
            .collect();

        for id in &expired {
            sessions.remove(id);
        }
        Ok(expired)
    }
}

//! Conversation session management.
//!
//! A session owns one conversation history. Turns are only ever added as a
//! complete (user, assistant) pair.

use crate::error::SessionError;
use crate::message::{Message, MessageRole};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derek_core::ConversationSessionId;
use serde::{Deserialize, Serialize};

const TITLE_MAX_CHARS: usize = 50;
const TITLE_ELLIPSIS: &str = "...";

/// A conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: ConversationSessionId,
    /// Messages in this session, oldest first.
    pub messages: Vec<Message>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last active.
    pub last_active_at: DateTime<Utc>,
    /// Pinned sessions are never expired or evicted.
    pub pinned: bool,
    /// Session metadata.
    pub metadata: SessionMetadata,
}

/// Session metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Optional session title (generated from first message).
    pub title: Option<String>,
}

impl Session {
    /// Creates a new, empty session.
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationSessionId::new(),
            messages: Vec::new(),
            created_at: now,
            last_active_at: now,
            pinned: false,
            metadata: SessionMetadata::default(),
        }
    }

    /// Creates a session that is exempt from expiry and eviction.
    #[must_use]
    pub fn pinned() -> Self {
        Self {
            pinned: true,
            ..Self::new()
        }
    }

    /// Appends a completed turn and refreshes the activity timestamp.
    pub fn append_turn(&mut self, user: Message, assistant: Message) {
        self.messages.push(user);
        self.messages.push(assistant);
        self.last_active_at = Utc::now();
        self.generate_title();
    }

    /// Drops all messages and the derived title.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.metadata.title = None;
        self.last_active_at = Utc::now();
    }

    /// Returns the number of messages.
    #[must_use]
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Renders the history as `User: ...` / `Assistant: ...` lines.
    ///
    /// An empty session renders as an empty string.
    #[must_use]
    pub fn render_history(&self) -> String {
        self.messages
            .iter()
            .map(Message::history_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns true if the session has seen no activity after `cutoff`.
    ///
    /// Pinned sessions are never idle.
    #[must_use]
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        !self.pinned && self.last_active_at < cutoff
    }

    /// Generates a title from the first user message.
    pub fn generate_title(&mut self) {
        if self.metadata.title.is_some() {
            return;
        }

        let Some(msg) = self.messages.iter().find(|m| m.role == MessageRole::User) else {
            return;
        };

        let title = if msg.content.chars().count() > TITLE_MAX_CHARS {
            let head: String = msg
                .content
                .chars()
                .take(TITLE_MAX_CHARS - TITLE_ELLIPSIS.len())
                .collect();
            format!("{head}{TITLE_ELLIPSIS}")
        } else {
            msg.content.clone()
        };
        self.metadata.title = Some(title);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Trait for session storage.
///
/// `get_session` returns a snapshot; callers never hold a reference into
/// the store while doing slow work.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Creates a new session.
    async fn create_session(&self) -> Result<Session, SessionError>;

    /// Gets a snapshot of a session by ID.
    async fn get_session(&self, id: ConversationSessionId) -> Result<Session, SessionError>;

    /// The session used when a request does not name one.
    fn default_session_id(&self) -> ConversationSessionId;

    /// Appends a (user, assistant) pair to a session in one step.
    async fn append_turn(
        &self,
        id: ConversationSessionId,
        user: Message,
        assistant: Message,
    ) -> Result<(), SessionError>;

    /// Removes every message from a session, keeping the session itself.
    async fn clear_messages(&self, id: ConversationSessionId) -> Result<(), SessionError>;

    /// Deletes a session.
    async fn delete_session(&self, id: ConversationSessionId) -> Result<(), SessionError>;

    /// Gets expired sessions (for cleanup).
    async fn get_expired_sessions(
        &self,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<ConversationSessionId>, SessionError>;

    /// Removes every session idle longer than the store's TTL and returns
    /// the removed ids.
    async fn evict_expired(&self) -> Result<Vec<ConversationSessionId>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn session_creation() {
        let session = Session::new();

        assert!(session.messages.is_empty());
        assert!(!session.pinned);
        assert_eq!(session.created_at, session.last_active_at);
        assert!(session.metadata.title.is_none());
    }

    #[test]
    fn append_turn_keeps_pair_order() {
        let mut session = Session::new();
        session.append_turn(Message::user("Hello!"), Message::assistant("Hi."));

        assert_eq!(session.message_count(), 2);
        assert_eq!(session.messages[0].role, MessageRole::User);
        assert_eq!(session.messages[1].role, MessageRole::Assistant);
        assert_eq!(session.messages[1].content, "Hi.");
    }

    #[test]
    fn render_history_lines() {
        let mut session = Session::new();
        assert_eq!(session.render_history(), "");

        session.append_turn(Message::user("hi"), Message::assistant("hello"));
        session.append_turn(Message::user("how are you?"), Message::assistant("fine"));

        assert_eq!(
            session.render_history(),
            "User: hi\nAssistant: hello\nUser: how are you?\nAssistant: fine"
        );
    }

    #[test]
    fn session_generate_title() {
        let mut session = Session::new();
        session.append_turn(
            Message::user("What's the weather today?"),
            Message::assistant("I can help with that."),
        );

        assert_eq!(
            session.metadata.title,
            Some("What's the weather today?".to_string())
        );
    }

    #[test]
    fn long_title_is_truncated_on_char_boundary() {
        let mut session = Session::new();
        session.append_turn(Message::user("é".repeat(60)), Message::assistant("ok"));

        let title = session.metadata.title.expect("title");
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
        assert!(title.starts_with(&"é".repeat(47)));
    }

    #[test]
    fn clear_resets_history_and_title() {
        let mut session = Session::new();
        session.append_turn(Message::user("first"), Message::assistant("reply"));
        session.clear_messages();

        assert!(session.messages.is_empty());
        assert!(session.metadata.title.is_none());

        session.append_turn(Message::user("second"), Message::assistant("reply"));
        assert_eq!(session.metadata.title.as_deref(), Some("second"));
    }

    #[test]
    fn idle_check_ignores_pinned_sessions() {
        let mut session = Session::new();
        session.last_active_at -= TimeDelta::minutes(90);
        let cutoff = Utc::now() - TimeDelta::minutes(60);
        assert!(session.is_idle_since(cutoff));

        let mut pinned = Session::pinned();
        pinned.last_active_at -= TimeDelta::minutes(90);
        assert!(!pinned.is_idle_since(cutoff));
    }

    #[test]
    fn session_serde_roundtrip() {
        let mut session = Session::new();
        session.append_turn(Message::user("Test"), Message::assistant("Reply"));

        let json = serde_json::to_string(&session).expect("serialize");
        let parsed: Session = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(session.id, parsed.id);
        assert_eq!(session.message_count(), parsed.message_count());
    }
}

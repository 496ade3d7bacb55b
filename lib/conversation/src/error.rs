//! Error types for the conversation crate.
//!
//! - `SessionError`: errors from session store operations
//! - `ConversationError`: errors from running a chat turn

use derek_ai::{LlmError, PromptError};
use derek_core::ConversationSessionId;
use std::fmt;

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session not found.
    NotFound { id: ConversationSessionId },
    /// Session has been idle longer than the store's TTL.
    Expired { id: ConversationSessionId },
    /// The session is pinned and cannot be removed.
    Pinned { id: ConversationSessionId },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "session not found: {id}"),
            Self::Expired { id } => write!(f, "session expired: {id}"),
            Self::Pinned { id } => write!(f, "session {id} is pinned and cannot be deleted"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Errors from running a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// The session could not be resolved or updated.
    Session(SessionError),
    /// The prompt template could not be rendered.
    Prompt(PromptError),
    /// The LLM call failed.
    Llm(LlmError),
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session(err) => write!(f, "session error: {err}"),
            Self::Prompt(err) => write!(f, "prompt error: {err}"),
            Self::Llm(err) => write!(f, "llm error: {err}"),
        }
    }
}

impl std::error::Error for ConversationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Session(err) => Some(err),
            Self::Prompt(err) => Some(err),
            Self::Llm(err) => Some(err),
        }
    }
}

impl From<SessionError> for ConversationError {
    fn from(err: SessionError) -> Self {
        Self::Session(err)
    }
}

impl From<PromptError> for ConversationError {
    fn from(err: PromptError) -> Self {
        Self::Prompt(err)
    }
}

impl From<LlmError> for ConversationError {
    fn from(err: LlmError) -> Self {
        Self::Llm(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn session_error_display() {
        let id = ConversationSessionId::new();
        let err = SessionError::NotFound { id };
        assert!(err.to_string().contains("session not found"));
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn conversation_error_keeps_source() {
        let err = ConversationError::from(LlmError::Timeout);
        assert!(err.to_string().starts_with("llm error"));
        assert!(err.source().is_some());

        let prompt = ConversationError::from(PromptError::MissingVariable {
            template: "conversation".to_string(),
            variable: "input".to_string(),
        });
        assert!(prompt.to_string().contains("input"));
        assert!(prompt.source().is_some());
    }
}

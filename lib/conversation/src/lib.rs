//! Conversation sessions and the chat chain.
//!
//! This crate provides:
//! - Message and session types with ordered, pair-wise history
//! - The `SessionManager` trait and its in-memory store
//! - `ConversationChain`, which renders a prompt from history and calls the LLM

pub mod chain;
pub mod error;
pub mod message;
pub mod session;
pub mod store;

pub use chain::{ChatReply, ConversationChain};
pub use error::{ConversationError, SessionError};
pub use message::{Message, MessageRole};
pub use session::{Session, SessionManager, SessionMetadata};
pub use store::{InMemorySessionStore, SessionStoreConfig};

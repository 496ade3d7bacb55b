//! Core domain types for the derek chat service.
//!
//! This crate provides the strongly-typed identifiers and the shared
//! `Result` alias used by the AI, conversation and server crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationSessionId, LlmInvocationId, MessageId, ParseIdError};

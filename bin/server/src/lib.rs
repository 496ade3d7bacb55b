//! derek HTTP server.
//!
//! Exposes `POST /chat` and session management routes over a
//! [`ConversationChain`](derek_conversation::ConversationChain) backed by
//! Gemini.

pub mod app;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

//! Shared application state.

use derek_conversation::{ConversationChain, SessionManager};
use std::sync::Arc;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Runs chat turns.
    pub chain: ConversationChain,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(chain: ConversationChain) -> Self {
        Self { chain }
    }

    /// The session store behind the chain.
    pub fn sessions(&self) -> &Arc<dyn SessionManager> {
        self.chain.sessions()
    }
}

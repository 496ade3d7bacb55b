//! AI primitives for derek.
//!
//! - **Backend**: the [`LlmBackend`] trait and the Gemini implementation
//! - **Prompt**: templates with `{{variable}}` substitution slots
//! - **LLM Call**: a single inference with timeout, retry and timing
//! - **Retry**: bounded exponential backoff with jitter

pub mod backend;
pub mod error;
pub mod gemini;
pub mod llm_call;
pub mod prompt;
pub mod retry;

pub use backend::{LlmBackend, LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use error::{LlmError, PromptError};
pub use gemini::{GeminiBackend, GeminiConfig};
pub use llm_call::{LlmCall, LlmCallConfig, LlmCallResult};
pub use prompt::PromptTemplate;
pub use retry::RetryPolicy;

//! Error types for the HTTP layer and server startup.
//!
//! `ApiError` is what handlers return; it renders as `{"detail": "..."}`
//! with a status code. Provider details are logged, never sent to clients.
//! `ServerError` covers startup and serving, wrapped in a rootcause report.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use derek_ai::LlmError;
use derek_conversation::{ConversationError, SessionError};
use serde_json::json;
use std::fmt;

/// Errors returned by request handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request body failed validation.
    Validation(String),
    /// A session id could not be parsed.
    InvalidSessionId(String),
    /// The session is unknown or expired.
    SessionNotFound(String),
    /// The session may not be deleted.
    SessionPinned(String),
    /// The LLM provider failed.
    Upstream(LlmError),
    /// The LLM provider did not answer in time.
    UpstreamTimeout,
    /// Anything else.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            Self::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::InvalidSessionId(raw) => (
                StatusCode::BAD_REQUEST,
                format!("invalid session id: {raw}"),
            ),
            Self::SessionNotFound(id) => (StatusCode::NOT_FOUND, format!("session not found: {id}")),
            Self::SessionPinned(id) => (
                StatusCode::CONFLICT,
                format!("session {id} is the default session and cannot be deleted"),
            ),
            Self::Upstream(err) => {
                tracing::error!(error = %err, "LLM provider call failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "The language model service failed to respond".to_string(),
                )
            }
            Self::UpstreamTimeout => {
                tracing::warn!("LLM provider call timed out");
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "The language model service timed out".to_string(),
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound { id } | SessionError::Expired { id } => {
                Self::SessionNotFound(id.to_string())
            }
            SessionError::Pinned { id } => Self::SessionPinned(id.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => Self::UpstreamTimeout,
            LlmError::InvalidConfig { reason } => Self::Internal(reason),
            other => Self::Upstream(other),
        }
    }
}

impl From<ConversationError> for ApiError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::Session(err) => err.into(),
            ConversationError::Llm(err) => err.into(),
            ConversationError::Prompt(err) => Self::Internal(err.to_string()),
        }
    }
}

/// Errors that stop the server from starting or serving.
#[derive(Debug)]
pub enum ServerError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The LLM backend could not be built.
    Backend { details: String },
    /// CORS settings are invalid.
    Cors { origin: String },
    /// The listener could not be bound.
    Bind { address: String, details: String },
    /// The server stopped with an I/O error.
    Serve { details: String },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "failed to load configuration: {details}"),
            Self::Backend { details } => write!(f, "failed to build LLM backend: {details}"),
            Self::Cors { origin } => write!(f, "invalid CORS origin '{origin}'"),
            Self::Bind { address, details } => {
                write!(f, "failed to bind to {address}: {details}")
            }
            Self::Serve { details } => write!(f, "server error: {details}"),
        }
    }
}

impl std::error::Error for ServerError {}

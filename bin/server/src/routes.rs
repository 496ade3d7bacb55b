//! HTTP handlers for chat and session management.

use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use derek_conversation::{Message, Session};
use derek_core::ConversationSessionId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Session to continue; the default session when absent.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Response of `POST /chat`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The assistant's reply.
    pub response: String,
    /// The session the turn was recorded in.
    pub session_id: String,
}

/// Response of `POST /sessions`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

/// Response of `GET /sessions/{id}`.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            title: session.metadata.title,
            created_at: session.created_at,
            last_active_at: session.last_active_at,
            messages: session.messages,
        }
    }
}

fn parse_session_id(raw: &str) -> Result<ConversationSessionId, ApiError> {
    raw.parse::<ConversationSessionId>()
        .map_err(|_| ApiError::InvalidSessionId(raw.to_string()))
}

/// Runs one chat turn.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = payload?;

    let session_id = request
        .session_id
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .map(parse_session_id)
        .transpose()?;

    let reply = state.chain.run(session_id, &request.message).await?;

    Ok(Json(ChatResponse {
        response: reply.response,
        session_id: reply.session_id.to_string(),
    }))
}

/// Starts a new, empty session.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let session = state.sessions().create_session().await?;
    tracing::info!(session_id = %session.id, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id.to_string(),
        }),
    ))
}

/// Returns a session with its full history.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = state.sessions().get_session(id).await?;
    Ok(Json(session.into()))
}

/// Clears a session's history.
pub async fn clear_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    state.sessions().clear_messages(id).await?;
    tracing::info!(session_id = %id, "Session history cleared");
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes a session.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    state.sessions().delete_session(id).await?;
    tracing::info!(session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

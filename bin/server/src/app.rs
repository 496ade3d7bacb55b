//! Router assembly and application wiring.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::routes;
use crate::state::AppState;
use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post},
};
use derek_ai::{GeminiBackend, LlmCall};
use derek_conversation::{ConversationChain, InMemorySessionStore, SessionManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builds the HTTP router.
pub fn router(state: Arc<AppState>, cors: CorsLayer) -> Router {
    Router::new()
        .route("/chat", post(routes::chat))
        .route("/sessions", post(routes::create_session))
        .route(
            "/sessions/{id}",
            get(routes::get_session).delete(routes::delete_session),
        )
        .route("/sessions/{id}/messages", delete(routes::clear_messages))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS policy allowing credentials.
///
/// With no configured origins, or a `*` among them, every origin is
/// mirrored back, since a wildcard origin is not allowed together with
/// credentials.
///
/// # Errors
///
/// Returns [`ServerError::Cors`] if an origin is not a valid header value.
pub fn cors_layer(allowed_origins: &[String]) -> Result<CorsLayer, ServerError> {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o.trim() == "*") {
        return Ok(CorsLayer::very_permissive());
    }

    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ServerError::Cors {
                origin: origin.clone(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Builds the Gemini-backed chain and the session store from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Backend`] if the Gemini backend rejects its
/// configuration.
pub fn build_state(config: &ServerConfig) -> Result<Arc<AppState>, ServerError> {
    let backend = GeminiBackend::new(config.gemini_config()).map_err(|e| ServerError::Backend {
        details: e.to_string(),
    })?;

    let sessions = Arc::new(InMemorySessionStore::new(config.session_store_config()));
    let llm = LlmCall::new(Arc::new(backend), config.llm_call_config());
    let chain = ConversationChain::new(llm, sessions).with_verbose(config.llm.verbose);

    Ok(Arc::new(AppState::new(chain)))
}

/// Spawns the periodic sweep that evicts expired sessions.
pub fn spawn_session_cleanup(
    sessions: Arc<dyn SessionManager>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match sessions.evict_expired().await {
                Ok(evicted) if !evicted.is_empty() => {
                    tracing::info!(evicted_sessions = evicted.len(), "Evicted expired sessions");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to evict expired sessions");
                }
            }
        }
    })
}

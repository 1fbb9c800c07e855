use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::server::handlers;
use crate::server::state::AppState;

/// Slack for the JSON envelope around a base64 upload.
const ENVELOPE_BYTES: usize = 64 * 1024;

/// Creates the application router: the chat page, health check and session API.
pub fn router(state: Arc<AppState>) -> Router {
    // base64 inflates uploads by a third
    let body_limit = state.config.max_upload_bytes.saturating_mul(4) / 3 + ENVELOPE_BYTES;

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/sessions", post(handlers::create_session))
        .route(
            "/api/sessions/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/api/sessions/:session_id/documents",
            post(handlers::upload_document),
        )
        .route("/api/sessions/:session_id/status", get(handlers::get_status))
        .route("/api/sessions/:session_id/ask", post(handlers::ask))
        .route(
            "/api/sessions/:session_id/transcript",
            get(handlers::get_transcript),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

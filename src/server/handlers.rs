use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::server::{error::ApiError, state::AppState};
use crate::session::Session;
use crate::storage::decode_payload;

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub filename: String,
    /// Base64 file contents, optionally as a `data:` URL.
    pub contents: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
}

/// Looks up a session and counts the request as activity.
async fn find_session(state: &AppState, id: &Uuid) -> Result<Arc<Session>, ApiError> {
    let session = state
        .sessions
        .get(id)
        .await
        .ok_or_else(ApiError::session_not_found)?;
    session.touch();
    Ok(session)
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.create().await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session_id": session.id(),
            "status": session.status(),
        })),
    ))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = find_session(&state, &session_id).await?;
    Ok(Json(session.summary().await))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if state.sessions.remove(&session_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::session_not_found())
    }
}

pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Query(params): Query<UploadParams>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = find_session(&state, &session_id).await?;

    let bytes = decode_payload(&payload.contents)?;
    let size = bytes.len();
    if size > state.config.max_upload_bytes {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} is {} bytes; the limit is {}",
            payload.filename,
            size,
            state.config.max_upload_bytes
        )));
    }
    debug!(
        "Upload for session {}: {} ({} bytes, wait={})",
        session_id,
        payload.filename,
        size,
        params.wait
    );

    let job = session
        .upload(Arc::clone(&state.ingestor), &payload.filename, bytes)
        .await?;
    let generation = job.generation;

    let code = if params.wait {
        job.wait().await?;
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        code,
        Json(json!({
            "session_id": session_id,
            "generation": generation,
            "status": session.status(),
        })),
    ))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = find_session(&state, &session_id).await?;
    Ok(Json(session.status()))
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = find_session(&state, &session_id).await?;
    let turn = session.ask(&payload.question).await?;
    Ok(Json(turn))
}

pub async fn get_transcript(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = find_session(&state, &session_id).await?;
    Ok(Json(json!({ "turns": session.transcript().await })))
}

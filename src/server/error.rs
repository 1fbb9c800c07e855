use axum::{Json, http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use crate::error::DokuError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("unprocessable document: {0}")]
    Unprocessable(String),
    #[error("upstream service failed: {0}")]
    BadGateway(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn session_not_found() -> Self {
        ApiError::NotFound("Session not found".to_string())
    }
}

impl From<DokuError> for ApiError {
    fn from(err: DokuError) -> Self {
        let message = err.to_string();
        match err {
            DokuError::InvalidUpload(_)
            | DokuError::InvalidRequest(_)
            | DokuError::UnsupportedDocument(_) => ApiError::BadRequest(message),
            DokuError::Extraction { .. } | DokuError::EmptyDocument => {
                ApiError::Unprocessable(message)
            }
            DokuError::Embedding(_) | DokuError::Generation(_) => ApiError::BadGateway(message),
            _ => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

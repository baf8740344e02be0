use crate::services::{movie_service::MovieError, object_store::ObjectStoreError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for errors returned to HTTP clients.
///
/// Only `message` reaches the client. Internal failures are logged where
/// they are converted and replaced by a generic per-operation message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Log `err` and answer with a generic 500 carrying `msg`.
    pub fn masked(msg: &'static str, err: impl fmt::Display) -> Self {
        tracing::error!(error = %err, "{}", msg);
        Self::internal(msg)
    }

    /// Map a catalog error, hiding anything unexpected behind `fallback`.
    pub fn from_movie_error(err: MovieError, fallback: &'static str) -> Self {
        match err {
            MovieError::BadRequest(msg) => Self::bad_request(msg),
            MovieError::NotFound(_) => Self::not_found("Movie not found"),
            other => Self::masked(fallback, other),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));

        (self.status, body).into_response()
    }
}

/// Errors from the signed upload endpoint.
impl From<ObjectStoreError> for AppError {
    fn from(err: ObjectStoreError) -> Self {
        match err {
            ObjectStoreError::InvalidObjectKey(_) => Self::bad_request(err.to_string()),
            ObjectStoreError::MissingAuthorization(_)
            | ObjectStoreError::AuthorizationExpired(_)
            | ObjectStoreError::InvalidSignature(_) => {
                Self::new(StatusCode::FORBIDDEN, err.to_string())
            }
            ObjectStoreError::ObjectExists(_) => Self::new(StatusCode::CONFLICT, err.to_string()),
            ObjectStoreError::ObjectNotFound(_) => Self::not_found("Object not found"),
            other => Self::masked("Failed to store object", other),
        }
    }
}

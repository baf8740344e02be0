//! Object transfer handlers.
//!
//! - PUT /uploads/{*key} -> target of the signed URLs issued by `POST /upload-urls`
//! - GET /objects/{*key} -> default delivery route for listed video and thumbnail URLs
//!
//! Both stream bodies without buffering them in memory.

use crate::{errors::AppError, services::object_store::StoredObject, state::AppState};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use serde::Deserialize;
use std::io;
use tokio_util::io::ReaderStream;

/// Authorization carried in the query string of a signed upload URL.
#[derive(Debug, Deserialize)]
pub struct SignedUploadQuery {
    pub expires: Option<u64>,
    pub signature: Option<String>,
}

/// `PUT /uploads/{*key}?expires=..&signature=..`
pub async fn upload_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<SignedUploadQuery>,
    body: Body,
) -> Result<Response, AppError> {
    state
        .uploads
        .verify_upload(&key, q.expires, q.signature.as_deref())?;

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let object = state.uploads.upload_object_stream(&key, stream).await?;
    tracing::info!(key = %object.key, size_bytes = object.size_bytes, "object uploaded");

    Ok((StatusCode::OK, etag_headers(&object)).into_response())
}

/// `GET /objects/{*key}`
pub async fn download_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let (file, len) = state.uploads.open_object(&key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    Ok(response)
}

fn etag_headers(object: &StoredObject) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", object.etag)) {
        headers.insert(header::ETAG, value);
    }
    headers
}

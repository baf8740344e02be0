//! HTTP handlers for the movie catalog operations.
//!
//! Bodies are read as raw bytes so that malformed JSON is reported the same
//! way as any other unexpected failure (500 with a generic message) rather
//! than through the extractor's own rejection.

use crate::{
    errors::AppError,
    handlers::parse_json_body,
    models::movie::{
        CreateMovieRequest, DeleteMovieRequest, MessageResponse, MovieSummary, UploadUrlsRequest,
        UploadUrlsResponse,
    },
    state::AppState,
};
use axum::{Json, extract::State};
use bytes::Bytes;

const UPLOAD_URLS_FAILED: &str = "Failed to issue upload URLs";
const CREATE_FAILED: &str = "Failed to add movie";
const LIST_FAILED: &str = "Failed to list movies";
const DELETE_FAILED: &str = "Failed to delete movie";

/// `POST /upload-urls`
pub async fn issue_upload_urls(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<UploadUrlsResponse>, AppError> {
    let request: UploadUrlsRequest =
        parse_json_body(&body).map_err(|err| AppError::masked(UPLOAD_URLS_FAILED, err))?;

    let response = state
        .movies
        .issue_upload_urls(request)
        .await
        .map_err(|err| AppError::from_movie_error(err, UPLOAD_URLS_FAILED))?;

    Ok(Json(response))
}

/// `POST /movies`
pub async fn create_movie(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let request: CreateMovieRequest =
        parse_json_body(&body).map_err(|err| AppError::masked(CREATE_FAILED, err))?;

    state
        .movies
        .create_movie(request)
        .await
        .map_err(|err| AppError::from_movie_error(err, CREATE_FAILED))?;

    Ok(Json(MessageResponse::new("Movie added successfully")))
}

/// `GET /movies`
pub async fn list_movies(
    State(state): State<AppState>,
) -> Result<Json<Vec<MovieSummary>>, AppError> {
    let movies = state
        .movies
        .list_movies()
        .await
        .map_err(|err| AppError::from_movie_error(err, LIST_FAILED))?;

    Ok(Json(movies))
}

/// `DELETE /movies` with `{"id": ...}`
pub async fn delete_movie(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MessageResponse>, AppError> {
    let request: DeleteMovieRequest =
        parse_json_body(&body).map_err(|err| AppError::masked(DELETE_FAILED, err))?;

    state
        .movies
        .delete_movie(request)
        .await
        .map_err(|err| AppError::from_movie_error(err, DELETE_FAILED))?;

    Ok(Json(MessageResponse::new("Movie deleted successfully")))
}

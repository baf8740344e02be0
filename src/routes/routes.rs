//! Defines routes for the movie catalog API.
//!
//! ## Structure
//! - **Catalog endpoints** (CORS: any origin)
//!   - `POST   /upload-urls`: issue signed upload URLs for a video and a thumbnail
//!   - `POST   /movies`: create a movie record
//!   - `GET    /movies`: list every movie
//!   - `DELETE /movies`: delete a movie and its objects (`{"id": ...}`)
//!
//! - **Object transfer** (CORS: any origin, any request header)
//!   - `PUT    /uploads/{*key}`: signed direct upload from the browser
//!   - `GET    /objects/{*key}`: download, the default target of listed URLs
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        movie_handlers::{create_movie, delete_movie, issue_upload_urls, list_movies},
        upload_handlers::{download_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    http::{Method, header},
    routing::{get, post, put},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Build the router for all routes.
///
/// The router carries shared state (`AppState`) to all handlers. Each
/// catalog path gets its own CORS layer so preflight responses only
/// advertise the verbs that path serves.
pub fn routes() -> Router<AppState> {
    let upload_urls = Router::new()
        .route("/upload-urls", post(issue_upload_urls))
        .layer(cors_for([Method::POST]));

    let movies = Router::new()
        .route(
            "/movies",
            get(list_movies).post(create_movie).delete(delete_movie),
        )
        .layer(cors_for([Method::GET, Method::POST, Method::DELETE]));

    // Browsers PUT with whatever Content-Type the file has, so any header is allowed.
    let uploads = Router::new()
        .route("/uploads/{*key}", put(upload_object))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::PUT, Method::OPTIONS])
                .allow_headers(Any),
        );

    let objects = Router::new()
        .route("/objects/{*key}", get(download_object))
        .layer(cors_for([Method::GET]));

    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .merge(upload_urls)
        .merge(movies)
        .merge(uploads)
        .merge(objects)
        .layer(TraceLayer::new_for_http())
}

fn cors_for<const N: usize>(methods: [Method; N]) -> CorsLayer {
    let allowed: Vec<Method> = methods
        .into_iter()
        .chain(std::iter::once(Method::OPTIONS))
        .collect();

    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(allowed)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

//! Process-wide resources shared by every request.

use crate::services::{movie_service::MovieService, object_store::DiskObjectStore};
use std::sync::Arc;

/// Built once at startup and cloned into each handler. Holds only shared
/// handles; no handler owns any of it exclusively.
#[derive(Clone)]
pub struct AppState {
    pub movies: MovieService,

    /// Disk store that accepts the signed direct uploads.
    pub uploads: Arc<DiskObjectStore>,
}

impl AppState {
    pub fn new(movies: MovieService, uploads: Arc<DiskObjectStore>) -> Self {
        Self { movies, uploads }
    }
}

//! Movie upload and catalog service.
//!
//! Clients ask for signed upload URLs, upload a video and a thumbnail
//! directly to the object store, then register a movie record pointing at
//! the uploaded keys. Records can be listed (with content-delivery URLs) and
//! deleted together with their objects.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

//! Core data models for the movie catalog.
//!
//! `MovieRecord` is what the record store persists; the remaining types are
//! the JSON request and response bodies of the HTTP operations.

pub mod movie;

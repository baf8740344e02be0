pub mod movie_service;
pub mod object_store;
pub mod record_store;

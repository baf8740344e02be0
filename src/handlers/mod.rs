pub mod health_handlers;
pub mod movie_handlers;
pub mod upload_handlers;

use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Decode a JSON request body, treating an empty body as `{}`.
pub(crate) fn parse_json_body<T: DeserializeOwned>(body: &Bytes) -> serde_json::Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        serde_json::from_slice(b"{}")
    } else {
        serde_json::from_slice(body)
    }
}

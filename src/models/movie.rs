//! Movie catalog records and the JSON bodies exchanged with clients.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single catalog entry as persisted in the record store.
///
/// `video_key` and `thumbnail_key` usually hold bare object-store keys, but
/// older entries may carry fully-qualified URLs; the delete path copes with
/// both. Nothing ties these fields to objects that actually exist.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovieRecord {
    /// Server-generated identifier, assigned once at creation.
    pub id: String,

    pub title: String,

    /// Object-store key (or URL) of the uploaded video.
    pub video_key: String,

    /// Object-store key (or URL) of the uploaded thumbnail.
    pub thumbnail_key: String,

    /// Creation time. Never updated.
    pub uploaded_at: DateTime<Utc>,

    /// Opaque client-supplied document, `{}` when none was given.
    pub metadata: Value,
}

/// Body of `POST /upload-urls`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsRequest {
    pub video_file_name: Option<String>,
    pub thumbnail_file_name: Option<String>,
}

/// Two object keys and their time-limited upload authorizations.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlsResponse {
    pub video_upload_url: String,
    pub thumbnail_upload_url: String,
    pub video_key: String,
    pub thumbnail_key: String,
}

/// Body of `POST /movies`.
///
/// Clients send the keys returned by `/upload-urls` under either the
/// `videoUrl` or the `videoKey` name (same for the thumbnail).
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMovieRequest {
    pub title: Option<String>,
    #[serde(alias = "videoKey")]
    pub video_url: Option<String>,
    #[serde(alias = "thumbnailKey")]
    pub thumbnail_url: Option<String>,
    pub metadata: Option<Value>,
}

/// Body of `DELETE /movies`.
#[derive(Debug, Default, Deserialize)]
pub struct DeleteMovieRequest {
    pub id: Option<String>,
}

/// One entry of the `GET /movies` listing, with keys rewritten into
/// content-delivery URLs.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MovieSummary {
    pub id: String,
    pub title: String,
    pub video_url: String,
    pub thumbnail_url: String,
    pub uploaded_at: String,
    pub metadata: Value,
}

impl MovieSummary {
    /// `delivery_base` is an absolute URL such as `https://cdn.example.com`.
    pub fn from_record(record: MovieRecord, delivery_base: &str) -> Self {
        Self {
            video_url: delivery_url(delivery_base, &record.video_key),
            thumbnail_url: delivery_url(delivery_base, &record.thumbnail_key),
            uploaded_at: record
                .uploaded_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
            id: record.id,
            title: record.title,
            metadata: record.metadata,
        }
    }
}

/// Plain acknowledgment body.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn delivery_url(delivery_base: &str, key: &str) -> String {
    format!("{}/{}", delivery_base.trim_end_matches('/'), key)
}

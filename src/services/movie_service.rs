//! MovieService: the four catalog operations over a record store and an
//! object store.
//!
//! Every step inside an operation is awaited before the next one starts, and
//! nothing wraps the steps in a transaction. In particular a delete that
//! fails on the record store after the objects were removed leaves a record
//! pointing at missing objects; there is no rollback.

use crate::{
    models::movie::{
        CreateMovieRequest, DeleteMovieRequest, MovieRecord, MovieSummary, UploadUrlsRequest,
        UploadUrlsResponse,
    },
    services::{
        object_store::{ObjectStore, ObjectStoreError, ObjectStoreResult},
        record_store::{RecordStore, RecordStoreError, RecordStoreResult},
    },
};
use chrono::Utc;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

/// Validity window of an upload authorization.
pub const UPLOAD_URL_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum MovieError {
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("movie `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Records(#[from] RecordStoreError),
    #[error(transparent)]
    Objects(#[from] ObjectStoreError),
}

pub type MovieResult<T> = Result<T, MovieError>;

#[derive(Clone)]
pub struct MovieService {
    records: Arc<dyn RecordStore>,
    objects: Arc<dyn ObjectStore>,
    delivery_base: String,
}

impl MovieService {
    pub fn new(
        records: Arc<dyn RecordStore>,
        objects: Arc<dyn ObjectStore>,
        delivery_base: impl Into<String>,
    ) -> Self {
        Self {
            records,
            objects,
            delivery_base: delivery_base.into(),
        }
    }

    /// Generate fresh video and thumbnail keys and an upload URL for each.
    ///
    /// Nothing is written to the object store here; the client uploads
    /// directly with the returned URLs.
    pub async fn issue_upload_urls(
        &self,
        request: UploadUrlsRequest,
    ) -> MovieResult<UploadUrlsResponse> {
        let (Some(video_name), Some(thumbnail_name)) = (
            non_empty(request.video_file_name),
            non_empty(request.thumbnail_file_name),
        ) else {
            return Err(MovieError::BadRequest(
                "videoFileName and thumbnailFileName are required",
            ));
        };

        let video_key = format!("videos/{}-{}", Uuid::new_v4(), video_name);
        let thumbnail_key = format!("thumbnails/{}-{}", Uuid::new_v4(), thumbnail_name);

        let video_upload_url = self.objects.presign_put(&video_key, UPLOAD_URL_TTL).await?;
        let thumbnail_upload_url = self
            .objects
            .presign_put(&thumbnail_key, UPLOAD_URL_TTL)
            .await?;

        debug!(video_key = %video_key, thumbnail_key = %thumbnail_key, "issued upload urls");

        Ok(UploadUrlsResponse {
            video_upload_url,
            thumbnail_upload_url,
            video_key,
            thumbnail_key,
        })
    }

    /// Persist a new record for already-uploaded objects.
    ///
    /// The keys are not checked against the object store.
    pub async fn create_movie(&self, request: CreateMovieRequest) -> MovieResult<MovieRecord> {
        let (Some(title), Some(video_key), Some(thumbnail_key)) = (
            non_empty(request.title),
            non_empty(request.video_url),
            non_empty(request.thumbnail_url),
        ) else {
            return Err(MovieError::BadRequest(
                "title, videoUrl and thumbnailUrl are required",
            ));
        };

        let metadata = match request.metadata {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(doc) => doc,
        };

        let record = MovieRecord {
            id: Uuid::new_v4().to_string(),
            title,
            video_key,
            thumbnail_key,
            uploaded_at: Utc::now(),
            metadata,
        };
        self.records.put(&record).await?;

        info!(id = %record.id, title = %record.title, "movie added");
        Ok(record)
    }

    /// Every record with its keys turned into content-delivery URLs.
    pub async fn list_movies(&self) -> MovieResult<Vec<MovieSummary>> {
        let records = self.records.scan().await?;
        debug!(count = records.len(), "listed movies");
        Ok(records
            .into_iter()
            .map(|record| MovieSummary::from_record(record, &self.delivery_base))
            .collect())
    }

    /// Look up the record, delete its video then its thumbnail object, then
    /// delete the record.
    pub async fn delete_movie(&self, request: DeleteMovieRequest) -> MovieResult<()> {
        let Some(id) = non_empty(request.id) else {
            return Err(MovieError::BadRequest("Movie ID is required"));
        };

        let record = self
            .records
            .get(&id)
            .await?
            .ok_or_else(|| MovieError::NotFound(id.clone()))?;

        for stored in [&record.video_key, &record.thumbnail_key] {
            let key = object_key_from_stored(stored);
            if key.is_empty() {
                continue;
            }
            self.objects.delete(&key).await?;
            debug!(id = %id, key = %key, "deleted movie object");
        }

        self.records.delete(&id).await?;

        info!(id = %id, "movie deleted");
        Ok(())
    }

    /// Probe both stores. Used by the readiness endpoint.
    pub async fn readiness(&self) -> (RecordStoreResult<()>, ObjectStoreResult<()>) {
        let records = self.records.ping().await;
        let objects = self.objects.ping().await;
        (records, objects)
    }
}

/// Object-store key for a value stored on a record.
///
/// A value that parses as an absolute URL yields its path without the
/// leading `/`; anything else is already a key and is returned unchanged.
pub fn object_key_from_stored(stored: &str) -> String {
    match Url::parse(stored) {
        Ok(url) => url
            .path()
            .strip_prefix('/')
            .unwrap_or(url.path())
            .to_string(),
        Err(_) => stored.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryRecords {
        rows: Mutex<Vec<MovieRecord>>,
    }

    #[async_trait]
    impl RecordStore for MemoryRecords {
        async fn get(&self, id: &str) -> RecordStoreResult<Option<MovieRecord>> {
            Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
        }

        async fn put(&self, record: &MovieRecord) -> RecordStoreResult<()> {
            self.rows.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn delete(&self, id: &str) -> RecordStoreResult<()> {
            self.rows.lock().unwrap().retain(|r| r.id != id);
            Ok(())
        }

        async fn scan(&self) -> RecordStoreResult<Vec<MovieRecord>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        async fn ping(&self) -> RecordStoreResult<()> {
            Ok(())
        }
    }

    /// Records every call in order.
    #[derive(Default)]
    struct RecordingObjects {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingObjects {
        async fn presign_put(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String> {
            self.calls.lock().unwrap().push(format!("presign {}", key));
            Ok(format!(
                "https://uploads.test/{}?ttl={}",
                key,
                expires_in.as_secs()
            ))
        }

        async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
            self.calls.lock().unwrap().push(format!("delete {}", key));
            Ok(())
        }

        async fn ping(&self) -> ObjectStoreResult<()> {
            Ok(())
        }
    }

    fn service() -> (MovieService, Arc<MemoryRecords>, Arc<RecordingObjects>) {
        let records = Arc::new(MemoryRecords::default());
        let objects = Arc::new(RecordingObjects::default());
        let svc = MovieService::new(records.clone(), objects.clone(), "https://cdn.test");
        (svc, records, objects)
    }

    #[test]
    fn key_extraction_handles_urls_and_bare_keys() {
        assert_eq!(
            object_key_from_stored("https://cdn.test/videos/a.mp4"),
            "videos/a.mp4"
        );
        assert_eq!(
            object_key_from_stored("https://bucket.s3.amazonaws.com/thumbnails/x/y.jpg?v=1"),
            "thumbnails/x/y.jpg"
        );
        assert_eq!(object_key_from_stored("videos/a.mp4"), "videos/a.mp4");
        assert_eq!(
            object_key_from_stored("thumbnails/123-my pic.jpg"),
            "thumbnails/123-my pic.jpg"
        );
    }

    #[test]
    fn key_extraction_is_stable_under_rewrapping() {
        let key = "videos/0b8e-clip.mp4";
        let wrapped = format!("https://cdn.test/{}", key);
        assert_eq!(object_key_from_stored(&wrapped), key);
        assert_eq!(
            object_key_from_stored(&object_key_from_stored(&wrapped)),
            key
        );
    }

    #[tokio::test]
    async fn upload_urls_use_prefixed_unique_keys() {
        let (svc, _, objects) = service();
        let request = || UploadUrlsRequest {
            video_file_name: Some("a.mp4".into()),
            thumbnail_file_name: Some("a.jpg".into()),
        };

        let first = svc.issue_upload_urls(request()).await.unwrap();
        let second = svc.issue_upload_urls(request()).await.unwrap();

        assert!(first.video_key.starts_with("videos/"));
        assert!(first.video_key.ends_with("-a.mp4"));
        assert!(first.thumbnail_key.starts_with("thumbnails/"));
        assert!(first.thumbnail_key.ends_with("-a.jpg"));
        assert_ne!(first.video_key, second.video_key);
        assert!(first.video_upload_url.ends_with("?ttl=300"));
        assert_eq!(objects.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn upload_urls_require_both_file_names() {
        let (svc, _, objects) = service();
        let err = svc
            .issue_upload_urls(UploadUrlsRequest {
                video_file_name: Some("a.mp4".into()),
                thumbnail_file_name: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MovieError::BadRequest(_)));
        assert!(objects.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_defaults_metadata_and_assigns_fresh_ids() {
        let (svc, records, _) = service();
        let request = || CreateMovieRequest {
            title: Some("A".into()),
            video_url: Some("videos/a.mp4".into()),
            thumbnail_url: Some("thumbnails/a.jpg".into()),
            metadata: None,
        };

        let a = svc.create_movie(request()).await.unwrap();
        let b = svc.create_movie(request()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(a.uploaded_at <= b.uploaded_at);
        assert_eq!(a.metadata, json!({}));
        assert_eq!(records.rows.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_requires_title_and_keys() {
        let (svc, records, _) = service();
        let err = svc
            .create_movie(CreateMovieRequest {
                title: Some(String::new()),
                video_url: Some("videos/a.mp4".into()),
                thumbnail_url: Some("thumbnails/a.jpg".into()),
                metadata: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MovieError::BadRequest(_)));
        assert!(records.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_video_then_thumbnail_then_record() {
        let (svc, records, objects) = service();
        records
            .put(&MovieRecord {
                id: "m1".into(),
                title: "A".into(),
                video_key: "https://cdn.test/videos/a.mp4".into(),
                thumbnail_key: "thumbnails/a.jpg".into(),
                uploaded_at: Utc::now(),
                metadata: json!({}),
            })
            .await
            .unwrap();

        svc.delete_movie(DeleteMovieRequest {
            id: Some("m1".into()),
        })
        .await
        .unwrap();

        assert_eq!(
            *objects.calls.lock().unwrap(),
            vec![
                "delete videos/a.mp4".to_string(),
                "delete thumbnails/a.jpg".to_string()
            ]
        );
        assert!(records.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_skips_values_that_name_no_object() {
        let (svc, records, objects) = service();
        records
            .put(&MovieRecord {
                id: "bare".into(),
                title: "A".into(),
                video_key: "https://cdn.test/".into(),
                thumbnail_key: String::new(),
                uploaded_at: Utc::now(),
                metadata: json!({}),
            })
            .await
            .unwrap();

        svc.delete_movie(DeleteMovieRequest {
            id: Some("bare".into()),
        })
        .await
        .unwrap();

        assert!(objects.calls.lock().unwrap().is_empty());
        assert!(records.rows.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_of_unknown_id_touches_nothing() {
        let (svc, _, objects) = service();
        let err = svc
            .delete_movie(DeleteMovieRequest {
                id: Some("missing".into()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MovieError::NotFound(id) if id == "missing"));
        assert!(objects.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_without_id_is_bad_request() {
        let (svc, _, _) = service();
        let err = svc
            .delete_movie(DeleteMovieRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Movie ID is required");
    }

    #[tokio::test]
    async fn list_rewrites_keys_into_delivery_urls() {
        let (svc, _, _) = service();
        svc.create_movie(CreateMovieRequest {
            title: Some("A".into()),
            video_url: Some("videos/a.mp4".into()),
            thumbnail_url: Some("thumbnails/a.jpg".into()),
            metadata: Some(json!({"director": "X"})),
        })
        .await
        .unwrap();

        let listed = svc.list_movies().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].video_url, "https://cdn.test/videos/a.mp4");
        assert_eq!(listed[0].thumbnail_url, "https://cdn.test/thumbnails/a.jpg");
        assert_eq!(listed[0].metadata, json!({"director": "X"}));
    }
}

//! src/services/object_store.rs
//!
//! Object store for uploaded videos and thumbnails. `DiskObjectStore` keeps
//! payloads on local disk beneath `base_path/{bucket}/{key}` and hands out
//! HMAC-signed, time-limited upload URLs that clients `PUT` to directly.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use hmac::{Hmac, Mac};
use md5::Context;
use sha2::Sha256;
use std::{
    fmt,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_OBJECT_KEY_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("public url `{0}` cannot carry an object path")]
    InvalidPublicUrl(String),
    #[error("upload authorization for `{0}` is missing")]
    MissingAuthorization(String),
    #[error("upload authorization for `{0}` has expired")]
    AuthorizationExpired(String),
    #[error("upload authorization for `{0}` is invalid")]
    InvalidSignature(String),
    #[error("object `{0}` already exists")]
    ObjectExists(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("signing key rejected: {0}")]
    SigningKey(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ObjectStoreResult<T> = Result<T, ObjectStoreError>;

/// Blob storage addressed by key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Issue a URL that authorizes one `PUT` of `key` until `expires_in` elapses.
    async fn presign_put(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String>;

    /// Remove the object at `key`. Removing a missing object succeeds.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()>;

    /// Cheap probe for readiness checks.
    async fn ping(&self) -> ObjectStoreResult<()>;
}

/// Result of a completed upload.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub size_bytes: i64,
    pub etag: String,
}

/// Local-disk object store with signed direct uploads.
#[derive(Clone)]
pub struct DiskObjectStore {
    /// Base directory on disk; each bucket is a subdirectory.
    pub base_path: PathBuf,

    pub bucket: String,

    /// Region label mixed into upload signatures.
    pub region: String,

    /// Externally reachable base URL of this server, used for upload URLs.
    public_url: Url,

    signing_secret: String,
}

impl fmt::Debug for DiskObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiskObjectStore")
            .field("base_path", &self.base_path)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("public_url", &self.public_url.as_str())
            .finish_non_exhaustive()
    }
}

impl DiskObjectStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        public_url: &str,
        signing_secret: impl Into<String>,
    ) -> ObjectStoreResult<Self> {
        let public_url = Url::parse(public_url)?;
        if public_url.cannot_be_a_base() {
            return Err(ObjectStoreError::InvalidPublicUrl(public_url.to_string()));
        }

        Ok(Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            region: region.into(),
            public_url,
            signing_secret: signing_secret.into(),
        })
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    fn ensure_key_safe(&self, key: &str) -> ObjectStoreResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.split('/').any(|segment| segment == "..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
        if invalid {
            return Err(ObjectStoreError::InvalidObjectKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Physical payload path for `key`. Parent directories may not exist yet.
    pub fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_root().join(key)
    }

    fn signature(&self, key: &str, expires: u64) -> ObjectStoreResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.as_bytes())
            .map_err(|err| ObjectStoreError::SigningKey(err.to_string()))?;
        mac.update(
            format!(
                "PUT\n{}\n{}\n{}\n{}",
                self.region, self.bucket, key, expires
            )
            .as_bytes(),
        );
        Ok(mac)
    }

    fn upload_url(&self, key: &str, expires: u64) -> ObjectStoreResult<String> {
        let signature = hex::encode(self.signature(key, expires)?.finalize().into_bytes());

        let mut url = self.public_url.clone();
        url.path_segments_mut()
            .map_err(|_| ObjectStoreError::InvalidPublicUrl(self.public_url.to_string()))?
            .pop_if_empty()
            .push("uploads")
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    /// Check a presented upload authorization for `key`.
    ///
    /// Expiry is checked first; the signature comparison is constant-time.
    pub fn verify_upload(
        &self,
        key: &str,
        expires: Option<u64>,
        signature: Option<&str>,
    ) -> ObjectStoreResult<()> {
        self.ensure_key_safe(key)?;
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(ObjectStoreError::MissingAuthorization(key.to_string()));
        };

        if unix_now() > expires {
            return Err(ObjectStoreError::AuthorizationExpired(key.to_string()));
        }

        let provided = hex::decode(signature)
            .map_err(|_| ObjectStoreError::InvalidSignature(key.to_string()))?;
        self.signature(key, expires)?
            .verify_slice(&provided)
            .map_err(|_| ObjectStoreError::InvalidSignature(key.to_string()))
    }

    /// Stream-upload an object to disk.
    ///
    /// - Refuses keys that already hold an object.
    /// - Writes bytes incrementally to a temporary file while computing the
    ///   MD5 etag and size.
    /// - Fsyncs, then hard-links the temp file into the final location, so
    ///   a concurrent upload that published first wins and this one fails
    ///   with `ObjectExists`.
    ///
    /// Temp files are removed on every path.
    pub async fn upload_object_stream<S>(
        &self,
        key: &str,
        stream: S,
    ) -> ObjectStoreResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        if fs::try_exists(&file_path).await? {
            return Err(ObjectStoreError::ObjectExists(key.to_string()));
        }

        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            ObjectStoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(ObjectStoreError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(ObjectStoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(ObjectStoreError::Io(err));
        }

        let published = fs::hard_link(&tmp_path, &file_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        match published {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(ObjectStoreError::ObjectExists(key.to_string()));
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        let etag = format!("{:x}", digest.compute());
        debug!(key, size_bytes, etag = %etag, "stored object");

        Ok(StoredObject {
            key: key.to_string(),
            size_bytes,
            etag,
        })
    }

    /// Open an object for reading, returning the file and its length.
    pub async fn open_object(&self, key: &str) -> ObjectStoreResult<(File, u64)> {
        if self.ensure_key_safe(key).is_err() {
            return Err(ObjectStoreError::ObjectNotFound(key.to_string()));
        }

        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ObjectStoreError::ObjectNotFound(key.to_string())
            } else {
                ObjectStoreError::Io(err)
            }
        })?;
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(ObjectStoreError::ObjectNotFound(key.to_string()));
        }
        Ok((file, metadata.len()))
    }

    /// Recursively remove empty directories up to the bucket root.
    ///
    /// Stops when:
    /// - directory not empty
    /// - directory not found
    /// - reached root
    /// - encountered unexpected I/O errors
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn presign_put(&self, key: &str, expires_in: Duration) -> ObjectStoreResult<String> {
        self.ensure_key_safe(key)?;
        self.upload_url(key, unix_now() + expires_in.as_secs())
    }

    /// A key that could never have been stored (empty, traversal, control
    /// characters) has nothing on disk, so it is skipped rather than failing.
    async fn delete(&self, key: &str) -> ObjectStoreResult<()> {
        if let Err(err) = self.ensure_key_safe(key) {
            warn!(error = %err, "skipping delete of unstorable key");
            return Ok(());
        }

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
                return Ok(());
            }
            Err(err) => return Err(ObjectStoreError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent, &self.bucket_root()).await;
        }
        Ok(())
    }

    /// Best-effort write/read/delete of a temp file under the bucket root.
    async fn ping(&self) -> ObjectStoreResult<()> {
        let root = self.bucket_root();
        fs::create_dir_all(&root).await?;

        let tmp_path = root.join(format!(".readyz-{}", Uuid::new_v4()));
        fs::write(&tmp_path, b"readyz").await?;
        let read_back = fs::read(&tmp_path).await;
        let _ = fs::remove_file(&tmp_path).await;

        if read_back? != b"readyz" {
            return Err(ObjectStoreError::Io(io::Error::new(
                ErrorKind::InvalidData,
                "file content mismatch",
            )));
        }
        Ok(())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> DiskObjectStore {
        DiskObjectStore::new(
            dir.path(),
            "movie-app-uploads",
            "local",
            "http://localhost:3000",
            "test-secret",
        )
        .unwrap()
    }

    fn query_param(url: &str, name: &str) -> Option<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn rejects_unsafe_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        for key in ["", "/abs", "videos/../etc", "..", "a\\b", "bad\nkey"] {
            assert!(store.ensure_key_safe(key).is_err(), "accepted {:?}", key);
        }
        for key in ["videos/123-a.mp4", "videos/a..b.mp4", "videos/Movie...final.mp4"] {
            assert!(store.ensure_key_safe(key).is_ok(), "rejected {:?}", key);
        }
    }

    #[test]
    fn rejects_public_url_without_path_base() {
        let dir = TempDir::new().unwrap();
        let err = DiskObjectStore::new(dir.path(), "b", "local", "mailto:ops@example.com", "s");
        assert!(matches!(err, Err(ObjectStoreError::InvalidPublicUrl(_))));
    }

    #[tokio::test]
    async fn presigned_url_verifies_for_its_key_only() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let url = store
            .presign_put("videos/abc-movie file.mp4", Duration::from_secs(300))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:3000/uploads/videos/abc-movie%20file.mp4?"));
        let expires = query_param(&url, "expires").and_then(|v| v.parse().ok());
        let signature = query_param(&url, "signature");

        assert!(
            store
                .verify_upload("videos/abc-movie file.mp4", expires, signature.as_deref())
                .is_ok()
        );
        assert!(matches!(
            store.verify_upload("videos/other.mp4", expires, signature.as_deref()),
            Err(ObjectStoreError::InvalidSignature(_))
        ));
    }

    #[test]
    fn expired_or_missing_authorization_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let expired = unix_now() - 1;
        let signature = hex::encode(
            store
                .signature("videos/a.mp4", expired)
                .unwrap()
                .finalize()
                .into_bytes(),
        );

        assert!(matches!(
            store.verify_upload("videos/a.mp4", Some(expired), Some(&signature)),
            Err(ObjectStoreError::AuthorizationExpired(_))
        ));
        assert!(matches!(
            store.verify_upload("videos/a.mp4", None, Some(&signature)),
            Err(ObjectStoreError::MissingAuthorization(_))
        ));
        assert!(matches!(
            store.verify_upload("videos/a.mp4", Some(unix_now() + 60), Some("zz")),
            Err(ObjectStoreError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn upload_then_delete_prunes_directories() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let chunks: Vec<io::Result<Bytes>> = vec![
            Ok(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ];

        let stored = store
            .upload_object_stream("videos/nested/a.mp4", stream::iter(chunks))
            .await
            .unwrap();
        assert_eq!(stored.size_bytes, 11);
        assert_eq!(stored.etag, format!("{:x}", md5::compute(b"hello world")));
        assert!(store.object_path("videos/nested/a.mp4").exists());

        store.delete("videos/nested/a.mp4").await.unwrap();
        assert!(!store.object_path("videos/nested/a.mp4").exists());
        assert!(!store.bucket_root().join("videos").exists());

        // idempotent
        store.delete("videos/nested/a.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn second_upload_to_same_key_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let first = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"one"))]);
        store
            .upload_object_stream("thumbnails/t.jpg", first)
            .await
            .unwrap();

        let second = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"two"))]);
        let err = store.upload_object_stream("thumbnails/t.jpg", second).await;
        assert!(matches!(err, Err(ObjectStoreError::ObjectExists(_))));
        assert_eq!(
            std::fs::read(store.object_path("thumbnails/t.jpg")).unwrap(),
            b"one"
        );
    }

    #[tokio::test]
    async fn concurrent_uploads_to_one_key_keep_the_first() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let a = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"aaaa"))]);
        let b = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"bbbb"))]);

        let (ra, rb) = tokio::join!(
            store.upload_object_stream("videos/race.mp4", a),
            store.upload_object_stream("videos/race.mp4", b)
        );

        let winner: &[u8] = match (&ra, &rb) {
            (Ok(_), Err(ObjectStoreError::ObjectExists(_))) => b"aaaa",
            (Err(ObjectStoreError::ObjectExists(_)), Ok(_)) => b"bbbb",
            other => panic!("expected exactly one upload to win, got {:?}", other),
        };
        assert_eq!(
            std::fs::read(store.object_path("videos/race.mp4")).unwrap(),
            winner
        );
        let leftovers: Vec<_> = std::fs::read_dir(store.bucket_root().join("videos"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn delete_skips_keys_that_cannot_exist() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.delete("").await.is_ok());
        assert!(store.delete("videos/../../etc/passwd").await.is_ok());
    }

    #[tokio::test]
    async fn open_object_reports_missing_and_traversal_as_not_found() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let body = stream::iter(vec![Ok::<_, io::Error>(Bytes::from_static(b"frame"))]);
        store
            .upload_object_stream("videos/a..b.mp4", body)
            .await
            .unwrap();

        let (_, len) = store.open_object("videos/a..b.mp4").await.unwrap();
        assert_eq!(len, 5);
        assert!(matches!(
            store.open_object("videos/missing.mp4").await,
            Err(ObjectStoreError::ObjectNotFound(_))
        ));
        assert!(matches!(
            store.open_object("../secret").await,
            Err(ObjectStoreError::ObjectNotFound(_))
        ));
        assert!(matches!(
            store.open_object("videos").await,
            Err(ObjectStoreError::ObjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn ping_succeeds_on_writable_directory() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).ping().await.is_ok());
    }
}

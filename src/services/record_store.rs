//! Record store: movie records keyed by identifier.
//!
//! `SqliteRecordStore` keeps one row per movie in a single table whose name
//! comes from configuration. Column names follow the original item layout
//! (`video_url`, `thumbnail_url`) even though they normally hold object keys.

use crate::models::movie::MovieRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("table name `{0}` is invalid")]
    InvalidTableName(String),
    #[error("record `{id}` has unreadable metadata")]
    CorruptMetadata {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("record `{id}` has an unreadable upload timestamp")]
    CorruptTimestamp {
        id: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RecordStoreResult<T> = Result<T, RecordStoreError>;

/// Key-value persistence for movie records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Point lookup. `Ok(None)` when no record has this identifier.
    async fn get(&self, id: &str) -> RecordStoreResult<Option<MovieRecord>>;

    /// Insert a new record.
    async fn put(&self, record: &MovieRecord) -> RecordStoreResult<()>;

    /// Remove a record. Removing an absent identifier is not an error.
    async fn delete(&self, id: &str) -> RecordStoreResult<()>;

    /// Every record, unpaginated.
    async fn scan(&self) -> RecordStoreResult<Vec<MovieRecord>>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> RecordStoreResult<()>;
}

#[derive(Debug, FromRow)]
struct MovieRow {
    id: String,
    title: String,
    video_url: String,
    thumbnail_url: String,
    uploaded_at: String,
    metadata: Option<String>,
}

impl TryFrom<MovieRow> for MovieRecord {
    type Error = RecordStoreError;

    fn try_from(row: MovieRow) -> RecordStoreResult<Self> {
        let uploaded_at = DateTime::parse_from_rfc3339(&row.uploaded_at)
            .map_err(|source| RecordStoreError::CorruptTimestamp {
                id: row.id.clone(),
                source,
            })?
            .with_timezone(&Utc);

        let metadata = match row.metadata.as_deref().map(str::trim) {
            None | Some("") => Value::Object(Default::default()),
            Some(text) => {
                serde_json::from_str(text).map_err(|source| RecordStoreError::CorruptMetadata {
                    id: row.id.clone(),
                    source,
                })?
            }
        };

        Ok(MovieRecord {
            id: row.id,
            title: row.title,
            video_key: row.video_url,
            thumbnail_key: row.thumbnail_url,
            uploaded_at,
            metadata,
        })
    }
}

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Arc<SqlitePool>,
    table: String,
}

impl SqliteRecordStore {
    /// Bind the store to `table`. The name is interpolated into SQL text, so
    /// it must be a plain identifier.
    pub fn new(db: Arc<SqlitePool>, table: impl Into<String>) -> RecordStoreResult<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(RecordStoreError::InvalidTableName(table));
        }
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the movie table if it does not exist yet.
    pub async fn migrate(&self) -> RecordStoreResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                video_url TEXT NOT NULL,
                thumbnail_url TEXT NOT NULL,
                uploaded_at TEXT NOT NULL,
                metadata TEXT
            )",
            self.table
        );
        debug!("Executing migration SQL: {}", sql);
        sqlx::query(&sql).execute(&*self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, id: &str) -> RecordStoreResult<Option<MovieRecord>> {
        let sql = format!(
            "SELECT id, title, video_url, thumbnail_url, uploaded_at, metadata
             FROM {} WHERE id = ?",
            self.table
        );
        let row = sqlx::query_as::<_, MovieRow>(&sql)
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(MovieRecord::try_from).transpose()
    }

    async fn put(&self, record: &MovieRecord) -> RecordStoreResult<()> {
        let sql = format!(
            "INSERT INTO {} (id, title, video_url, thumbnail_url, uploaded_at, metadata)
             VALUES (?, ?, ?, ?, ?, ?)",
            self.table
        );
        sqlx::query(&sql)
            .bind(&record.id)
            .bind(&record.title)
            .bind(&record.video_key)
            .bind(&record.thumbnail_key)
            .bind(
                record
                    .uploaded_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            )
            .bind(record.metadata.to_string())
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RecordStoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let result = sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            debug!(id, "record already absent");
        }
        Ok(())
    }

    async fn scan(&self) -> RecordStoreResult<Vec<MovieRecord>> {
        let sql = format!(
            "SELECT id, title, video_url, thumbnail_url, uploaded_at, metadata
             FROM {} ORDER BY uploaded_at ASC, id ASC",
            self.table
        );
        let rows = sqlx::query_as::<_, MovieRow>(&sql)
            .fetch_all(&*self.db)
            .await?;
        rows.into_iter().map(MovieRecord::try_from).collect()
    }

    async fn ping(&self) -> RecordStoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }
}

/// ASCII letters, digits and `_`, not starting with a digit.
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

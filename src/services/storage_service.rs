//! src/services/storage_service.rs
//!
//! StorageService: bucket and object persistence backed by SQLite. Object
//! payloads are held in memory for the duration of a request and stored in
//! the `objects` table next to their metadata.

use crate::{
    models::{
        bucket::Bucket,
        metadata::{ObjectMetadata, PutObjectOptions},
        object::{DEFAULT_CONTENT_TYPE, Object, STANDARD_STORAGE_CLASS, compute_etag},
    },
    services::listing::{self, ListObjectsParams, ListObjectsResult},
};
use chrono::Utc;
use sqlx::{Executor, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{0}` is not empty")]
    BucketNotEmpty(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object with id {0} not found")]
    ObjectIdNotFound(i64),
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the object-store surface the rest of the crate
/// is built on:
/// - bucket create / head / list / delete (delete only when empty)
/// - object put (insert-or-update, ETag recomputed), get, head, delete
/// - ordered key scans used by the listing engine
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for all operations.
    pub db: Arc<SqlitePool>,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;

const BUCKET_COLUMNS: &str = "id, name, region, created_at";
const OBJECT_COLUMNS: &str = "id, bucket_name, key, size, content_type, etag, content_encoding, \
     content_disposition, cache_control, storage_class, created_at, updated_at";

impl StorageService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Basic key validation: non-empty, bounded, no NUL byte. Anything else
    /// is stored as given.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.as_bytes().contains(&0) {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// Enforces S3-like naming rules:
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let len = name.len();
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&len) {
            return Err(invalid("must be between 3 and 63 characters"));
        }

        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }

        if name.starts_with('.')
            || name.ends_with('.')
            || name.starts_with('-')
            || name.ends_with('-')
        {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }

        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }

        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }

        Ok(())
    }

    /// Fetch bucket metadata. Returns BucketNotFound if missing.
    pub async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets WHERE name = ?"
        ))
        .bind(bucket)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))
    }

    /// Existence check usable on the pool or inside a transaction.
    pub async fn bucket_exists<'e, E>(executor: E, bucket: &str) -> StorageResult<bool>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM buckets WHERE name = ?)")
            .bind(bucket)
            .fetch_one(executor)
            .await?;
        Ok(exists)
    }

    /// All buckets, ordered by name.
    pub async fn list_buckets(&self) -> StorageResult<Vec<Bucket>> {
        let buckets = sqlx::query_as::<_, Bucket>(&format!(
            "SELECT {BUCKET_COLUMNS} FROM buckets ORDER BY name ASC"
        ))
        .fetch_all(&*self.db)
        .await?;
        Ok(buckets)
    }

    /// Create a bucket. Returns BucketAlreadyExists on a name conflict.
    pub async fn create_bucket(&self, name: &str, region: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;

        let result = sqlx::query_as::<_, Bucket>(&format!(
            "INSERT INTO buckets (name, region, created_at) VALUES (?, ?, ?) RETURNING {BUCKET_COLUMNS}"
        ))
        .bind(name)
        .bind(region)
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await;

        match result {
            Ok(bucket) => {
                debug!(bucket = %bucket.name, region = %bucket.region, "bucket created");
                Ok(bucket)
            }
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Delete an empty bucket together with its notification rules.
    ///
    /// Returns BucketNotFound if missing and BucketNotEmpty while it still
    /// owns objects. Jobs created under the removed rules are kept.
    pub async fn delete_bucket(&self, name: &str) -> StorageResult<()> {
        let mut tx = self.db.begin().await?;

        if !Self::bucket_exists(&mut *tx, name).await? {
            return Err(StorageError::BucketNotFound(name.to_string()));
        }
        if Self::count_in_bucket(&mut *tx, name).await? > 0 {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        sqlx::query("DELETE FROM notification_rules WHERE bucket_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM buckets WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(bucket = %name, "bucket deleted");
        Ok(())
    }

    /// Number of objects currently stored in `bucket`.
    pub async fn count_in_bucket<'e, E>(executor: E, bucket: &str) -> StorageResult<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM objects WHERE bucket_name = ?")
            .bind(bucket)
            .fetch_one(executor)
            .await?;
        Ok(count)
    }

    async fn fetch_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_name = ? AND key = ?"
        ))
        .bind(bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?
        .ok_or_else(|| StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    /// Insert or overwrite an object.
    ///
    /// The ETag is recomputed from `payload` and the user metadata set is
    /// replaced, all in one transaction. The row id survives overwrites.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: &[u8],
        options: PutObjectOptions,
    ) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let etag = compute_etag(payload);
        let now = Utc::now();
        let content_type = options
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut tx = self.db.begin().await?;

        let object = sqlx::query_as::<_, Object>(&format!(
            r#"
            INSERT INTO objects (
                bucket_name, key, data, size, content_type, etag,
                content_encoding, content_disposition, cache_control,
                storage_class, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_name, key) DO UPDATE SET
                data = excluded.data,
                size = excluded.size,
                content_type = excluded.content_type,
                etag = excluded.etag,
                content_encoding = excluded.content_encoding,
                content_disposition = excluded.content_disposition,
                cache_control = excluded.cache_control,
                storage_class = excluded.storage_class,
                updated_at = excluded.updated_at
            RETURNING {OBJECT_COLUMNS}
            "#
        ))
        .bind(&bucket_rec.name)
        .bind(key)
        .bind(payload)
        .bind(payload.len() as i64)
        .bind(&content_type)
        .bind(&etag)
        .bind(&options.content_encoding)
        .bind(&options.content_disposition)
        .bind(&options.cache_control)
        .bind(STANDARD_STORAGE_CLASS)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM object_metadata WHERE object_id = ?")
            .bind(object.id)
            .execute(&mut *tx)
            .await?;
        for (meta_key, value) in &options.user_metadata {
            sqlx::query("INSERT INTO object_metadata (object_id, key, value) VALUES (?, ?, ?)")
                .bind(object.id)
                .bind(meta_key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(bucket = %bucket, key = %key, etag = %object.etag, size = object.size, "object stored");
        Ok(object)
    }

    /// Fetch an object's metadata and payload.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<(Object, Vec<u8>)> {
        let object = self.get_object_metadata(bucket, key).await?;
        let payload: Vec<u8> = sqlx::query_scalar("SELECT data FROM objects WHERE id = ?")
            .bind(object.id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;
        Ok((object, payload))
    }

    /// Fetch only object metadata. Verifies bucket existence first so a
    /// missing bucket is reported as such.
    pub async fn get_object_metadata(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        self.fetch_bucket(bucket).await?;
        self.fetch_object(bucket, key).await
    }

    /// Look up an object by row id; used by the delivery worker.
    pub async fn get_object_by_id(&self, id: i64) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!("SELECT {OBJECT_COLUMNS} FROM objects WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?
            .ok_or(StorageError::ObjectIdNotFound(id))
    }

    /// User metadata of an object, ordered by key.
    pub async fn user_metadata(&self, object_id: i64) -> StorageResult<Vec<ObjectMetadata>> {
        let rows = sqlx::query_as::<_, ObjectMetadata>(
            "SELECT object_id, key, value FROM object_metadata WHERE object_id = ? ORDER BY key ASC",
        )
        .bind(object_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Delete an object.
    ///
    /// Returns the removed row, or `None` when the key did not exist.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<Option<Object>> {
        self.ensure_key_safe(key)?;
        self.fetch_bucket(bucket).await?;

        let deleted = sqlx::query_as::<_, Object>(&format!(
            "DELETE FROM objects WHERE bucket_name = ? AND key = ? RETURNING {OBJECT_COLUMNS}"
        ))
        .bind(bucket)
        .bind(key)
        .fetch_optional(&*self.db)
        .await?;

        match &deleted {
            Some(object) => debug!(bucket = %bucket, key = %key, id = object.id, "object deleted"),
            None => debug!(bucket = %bucket, key = %key, "delete of missing object"),
        }
        Ok(deleted)
    }

    /// Ordered range scan: keys `> after` starting with `prefix`, ascending,
    /// at most `limit` rows.
    ///
    /// The prefix test compares bytes exactly; `LIKE` would be
    /// case-insensitive and treat `%`/`_` as wildcards.
    pub async fn scan_objects(
        &self,
        bucket: &str,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StorageResult<Vec<Object>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_name = "
        ));
        builder.push_bind(bucket);

        if !prefix.is_empty() {
            builder.push(" AND substr(CAST(key AS BLOB), 1, ");
            builder.push_bind(prefix.len() as i64);
            builder.push(") = CAST(");
            builder.push_bind(prefix);
            builder.push(" AS BLOB)");
        }

        if let Some(after) = after {
            builder.push(" AND key > ");
            builder.push_bind(after);
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(limit as i64);

        let rows: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// List objects following S3 ListObjectsV2 rules.
    ///
    /// Scans one row past the page size to detect truncation, then hands the
    /// page to [`listing::project`].
    pub async fn list_objects_v2(
        &self,
        bucket: &str,
        params: &ListObjectsParams,
    ) -> StorageResult<ListObjectsResult> {
        self.fetch_bucket(bucket).await?;
        let max_keys = params.effective_max_keys();

        let rows = self
            .scan_objects(bucket, params.prefix(), params.marker(), max_keys + 1)
            .await?;

        Ok(listing::project(
            rows,
            params.prefix(),
            params.delimiter(),
            max_keys,
        ))
    }
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Check if a string matches IPv4-like dotted decimal form.
/// Rejects names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|segment| {
        !segment.is_empty()
            && segment.len() <= 3
            && segment.chars().all(|c| c.is_ascii_digit())
            && segment.parse::<u8>().is_ok()
    })
}

#[cfg(test)]
impl StorageService {
    pub async fn object_exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM objects WHERE bucket_name = ? AND key = ?)",
        )
        .bind(bucket)
        .bind(key)
        .fetch_one(&*self.db)
        .await?;
        Ok(exists)
    }
}

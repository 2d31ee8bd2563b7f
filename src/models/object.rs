//! Represents an object stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Storage class reported for every object.
pub const STANDARD_STORAGE_CLASS: &str = "STANDARD";

/// Content type used when the writer does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Metadata row of a single object within a bucket.
///
/// The payload lives in the same table but is only loaded by
/// `StorageService::get_object`; everything else (listing, HEAD, the
/// delivery worker) works from this struct alone.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Row identifier, stable across overwrites of the same key.
    pub id: i64,

    /// Name of the parent bucket.
    pub bucket_name: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Payload size in bytes.
    pub size: i64,

    /// Content type (MIME type).
    pub content_type: String,

    /// Lowercase hex MD5 of the current payload, unquoted.
    pub etag: String,

    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,

    /// Storage class (always STANDARD here).
    pub storage_class: String,

    /// When the key was first written.
    pub created_at: DateTime<Utc>,

    /// When the payload was last written.
    pub updated_at: DateTime<Utc>,
}

/// Compute the ETag for a payload: lowercase hex MD5 of the bytes.
pub fn compute_etag(payload: &[u8]) -> String {
    format!("{:x}", md5::compute(payload))
}

//! Represents a logical bucket: a top-level container for objects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A storage bucket in the S3-compatible system.
///
/// Buckets act as flat namespaces for objects. The name is unique and never
/// changes after creation.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Row identifier.
    pub id: i64,

    /// Globally unique bucket name (must conform to DNS naming rules).
    pub name: String,

    /// Region reported for this bucket (e.g. "us-east-1").
    pub region: String,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}

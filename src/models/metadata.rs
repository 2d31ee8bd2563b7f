//! User-defined and system metadata supplied with an object write.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Prefix of the request headers carrying user metadata.
pub const USER_METADATA_PREFIX: &str = "x-amz-meta-";

/// A single user metadata entry (`x-amz-meta-<key>: <value>`).
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Reference to the associated object.
    pub object_id: i64,

    /// Metadata key without the `x-amz-meta-` prefix.
    pub key: String,

    /// Metadata value as plain text.
    pub value: String,
}

/// Optional attributes stored alongside a payload on put.
#[derive(Debug, Clone, Default)]
pub struct PutObjectOptions {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub content_disposition: Option<String>,
    pub cache_control: Option<String>,
    /// Replaces the whole user metadata set of the object.
    pub user_metadata: BTreeMap<String, String>,
}

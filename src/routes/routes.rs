//! Defines routes for all S3-like bucket and object operations.
//!
//! ## Structure
//! - **Service-level endpoints**
//!   - `GET    /`: list buckets
//!
//! - **Bucket-level endpoints**
//!   - `GET    /{bucket}`: list objects (prefix, delimiter, max-keys, tokens);
//!     `?notification` returns the notification configuration
//!   - `PUT    /{bucket}`: create bucket; `?notification` replaces the
//!     notification configuration
//!   - `HEAD   /{bucket}`: bucket existence
//!   - `DELETE /{bucket}`: delete an empty bucket
//!
//! - **Object-level endpoints**
//!   - `PUT    /{bucket}/{*key}`: upload object
//!   - `GET    /{bucket}/{*key}`: download object
//!   - `HEAD   /{bucket}/{*key}`: retrieve metadata only
//!   - `DELETE /{bucket}/{*key}`: delete object
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        bucket_handlers::{delete_bucket, get_bucket, head_bucket, list_buckets, put_bucket},
        health_handlers::{healthz, readyz},
        object_handlers::{delete_object, get_object, head_object, upload_object},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, put},
};

/// Largest object payload accepted in a single PUT.
pub const MAX_OBJECT_SIZE: usize = 256 * 1024 * 1024;

/// Build and return the router for all S3-compatible routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/", get(list_buckets))
        // Object-level routes
        .route(
            "/{bucket}/{*key}",
            put(upload_object)
                .get(get_object)
                .head(head_object)
                .delete(delete_object),
        )
        // Bucket-level routes
        .route(
            "/{bucket}",
            get(get_bucket)
                .put(put_bucket)
                .head(head_bucket)
                .delete(delete_bucket),
        )
        .layer(DefaultBodyLimit::max(MAX_OBJECT_SIZE))
}

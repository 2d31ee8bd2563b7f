//! HTTP handlers for object operations.
//! Writes go through `ObjectService` so that every put and delete also
//! records an event and queues notification jobs.

use crate::{
    errors::AppError,
    models::{
        metadata::{ObjectMetadata, PutObjectOptions, USER_METADATA_PREFIX},
        object::Object,
    },
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::collections::BTreeMap;

/// Format of `Last-Modified` (RFC 7231 IMF-fixdate).
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Upload an object to `/{bucket}/{*key}`.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let options = put_options_from_headers(&headers);
    let object = state
        .objects
        .put_object(&bucket, &key, &body, options)
        .await?;

    let mut resp_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", object.etag)) {
        resp_headers.insert(header::ETAG, value);
    }
    Ok((StatusCode::OK, resp_headers))
}

/// Download an object `/{bucket}/{*key}`.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let (meta, payload) = state.storage.get_object(&bucket, &key).await?;
    let user_metadata = state.storage.user_metadata(meta.id).await?;

    let mut response = Response::new(Body::from(payload));
    set_object_headers(response.headers_mut(), &meta, &user_metadata);
    Ok(response)
}

/// HEAD `/{bucket}/{*key}`: same headers as GET but no body.
pub async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let meta = state.storage.get_object_metadata(&bucket, &key).await?;
    let user_metadata = state.storage.user_metadata(meta.id).await?;

    let mut response = Response::new(Body::empty());
    set_object_headers(response.headers_mut(), &meta, &user_metadata);
    Ok(response)
}

/// DELETE `/{bucket}/{*key}`. Deleting a missing key still answers 204.
pub async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    state.objects.delete_object(&bucket, &key).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn header_string(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn put_options_from_headers(headers: &HeaderMap) -> PutObjectOptions {
    let user_metadata: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            let key = name.as_str().strip_prefix(USER_METADATA_PREFIX)?;
            let value = value.to_str().ok()?;
            Some((key.to_string(), value.to_string()))
        })
        .collect();

    PutObjectOptions {
        content_type: header_string(headers, header::CONTENT_TYPE),
        content_encoding: header_string(headers, header::CONTENT_ENCODING),
        content_disposition: header_string(headers, header::CONTENT_DISPOSITION),
        cache_control: header_string(headers, header::CACHE_CONTROL),
        user_metadata,
    }
}

fn set_object_headers(headers: &mut HeaderMap, meta: &Object, user_metadata: &[ObjectMetadata]) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size.max(0)));

    if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", meta.etag)) {
        headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&meta.updated_at.format(HTTP_DATE_FORMAT).to_string()) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    let optional = [
        (header::CONTENT_ENCODING, &meta.content_encoding),
        (header::CONTENT_DISPOSITION, &meta.content_disposition),
        (header::CACHE_CONTROL, &meta.cache_control),
    ];
    for (name, value) in optional {
        if let Some(value) = value.as_deref().and_then(|v| HeaderValue::from_str(v).ok()) {
            headers.insert(name, value);
        }
    }

    for entry in user_metadata {
        let name = format!("{USER_METADATA_PREFIX}{}", entry.key);
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&entry.value),
        ) {
            headers.insert(name, value);
        }
    }

    headers.insert(
        HeaderName::from_static("x-amz-storage-class"),
        HeaderValue::from_str(&meta.storage_class)
            .unwrap_or_else(|_| HeaderValue::from_static("STANDARD")),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_options_collect_user_metadata() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert("x-amz-meta-owner", HeaderValue::from_static("alice"));
        headers.insert("x-amz-acl", HeaderValue::from_static("private"));

        let options = put_options_from_headers(&headers);
        assert_eq!(options.content_type.as_deref(), Some("image/png"));
        assert_eq!(options.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(options.content_encoding, None);
        assert_eq!(options.user_metadata.len(), 1);
        assert_eq!(options.user_metadata["owner"], "alice");
    }
}

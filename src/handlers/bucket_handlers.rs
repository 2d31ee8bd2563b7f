//! HTTP handlers for bucket-level operations: bucket CRUD, ListObjectsV2
//! and the `?notification` subresource.

use crate::{
    errors::AppError,
    handlers::xml::{
        S3_XMLNS, XML_DECLARATION, decode_continuation_token, encode_continuation_token,
        xml_escape, xml_response,
    },
    models::notification_config::NotificationConfiguration,
    services::listing::{ListObjectsParams, ListObjectsResult},
    state::AppState,
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::SecondsFormat;
use serde::Deserialize;
use tracing::info;

/// Query params accepted on `GET /{bucket}`.
#[derive(Debug, Default, Deserialize)]
pub struct BucketGetQuery {
    /// Present (usually empty) for `?notification`.
    pub notification: Option<String>,
    #[serde(rename = "list-type")]
    pub list_type: Option<String>,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<String>,
    #[serde(rename = "continuation-token")]
    pub continuation_token: Option<String>,
    #[serde(rename = "start-after")]
    pub start_after: Option<String>,
}

/// Query params accepted on `PUT /{bucket}`.
#[derive(Debug, Default, Deserialize)]
pub struct BucketPutQuery {
    pub notification: Option<String>,
}

/// Optional request body of `PUT /{bucket}` (create bucket).
#[derive(Debug, Deserialize)]
pub struct CreateBucketConfiguration {
    #[serde(rename = "LocationConstraint")]
    pub location_constraint: Option<String>,
}

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";

/// GET `/`: list all buckets.
pub async fn list_buckets(State(state): State<AppState>) -> Result<Response, AppError> {
    let buckets = state.storage.list_buckets().await?;

    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(r#"<ListAllMyBucketsResult xmlns="{S3_XMLNS}">"#));
    xml.push_str("<Owner><ID>s3local</ID><DisplayName>s3local</DisplayName></Owner>");
    xml.push_str("<Buckets>");
    for bucket in &buckets {
        xml.push_str("<Bucket>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&bucket.name)));
        xml.push_str(&format!(
            "<CreationDate>{}</CreationDate>",
            bucket.created_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str("</Bucket>");
    }
    xml.push_str("</Buckets></ListAllMyBucketsResult>");
    Ok(xml_response(xml))
}

/// PUT `/{bucket}`: create bucket, or replace its notification
/// configuration with `?notification`.
pub async fn put_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketPutQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if q.notification.is_some() {
        return put_bucket_notification(state, bucket, body).await;
    }

    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let text = std::str::from_utf8(&body)
            .map_err(|e| AppError::malformed_xml(format!("body is not UTF-8: {e}")))?;
        let config: CreateBucketConfiguration = quick_xml::de::from_str(text)
            .map_err(|e| AppError::malformed_xml(format!("invalid CreateBucketConfiguration: {e}")))?;
        config.location_constraint.filter(|r| !r.is_empty())
    };
    let region = from_body
        .or_else(|| {
            headers
                .get(BUCKET_REGION_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| state.config.region.clone());

    state.storage.create_bucket(&bucket, &region).await?;
    info!(bucket = %bucket, region = %region, "bucket created");

    let mut response = Response::new(Body::empty());
    if let Ok(location) = HeaderValue::from_str(&format!("/{bucket}")) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

async fn put_bucket_notification(
    state: AppState,
    bucket: String,
    body: Bytes,
) -> Result<Response, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::malformed_xml("request body is empty"));
    }
    let text = std::str::from_utf8(&body)
        .map_err(|e| AppError::malformed_xml(format!("body is not UTF-8: {e}")))?;
    let config: NotificationConfiguration = quick_xml::de::from_str(text)
        .map_err(|e| AppError::malformed_xml(format!("invalid NotificationConfiguration: {e}")))?;
    let rules = config
        .to_rules()
        .map_err(|e| AppError::malformed_xml(e.0).with_resource(bucket.clone()))?;

    state.storage.fetch_bucket(&bucket).await?;
    let stored = state.notifications.replace_rules(&bucket, &rules).await?;
    info!(bucket = %bucket, rules = stored.len(), "notification configuration replaced");

    Ok(StatusCode::OK.into_response())
}

/// GET `/{bucket}`: ListObjectsV2, or the notification configuration
/// with `?notification`.
pub async fn get_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(q): Query<BucketGetQuery>,
) -> Result<Response, AppError> {
    if q.notification.is_some() {
        return get_bucket_notification(state, bucket).await;
    }
    list_objects(state, bucket, q).await
}

async fn get_bucket_notification(state: AppState, bucket: String) -> Result<Response, AppError> {
    state.storage.fetch_bucket(&bucket).await?;
    let rules = state.notifications.list_rules(&bucket).await?;
    let config = NotificationConfiguration::from_rules(&rules);

    let body = quick_xml::se::to_string(&config)
        .map_err(|e| AppError::internal(format!("failed to render notification configuration: {e}")))?;
    Ok(xml_response(format!("{XML_DECLARATION}{body}")))
}

async fn list_objects(
    state: AppState,
    bucket: String,
    q: BucketGetQuery,
) -> Result<Response, AppError> {
    if let Some(list_type) = q.list_type.as_deref() {
        if list_type != "2" {
            return Err(AppError::invalid_argument("Only list-type=2 is supported"));
        }
    }

    let max_keys = match q.max_keys.as_deref().filter(|v| !v.is_empty()) {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            AppError::invalid_argument(format!("max-keys `{raw}` is not an integer"))
        })?),
        None => None,
    };

    let continuation_token_raw = q.continuation_token.clone();
    let params = ListObjectsParams {
        prefix: q.prefix.clone(),
        delimiter: q.delimiter.clone(),
        continuation_token: continuation_token_raw
            .as_deref()
            .map(decode_continuation_token),
        start_after: q.start_after.clone(),
        max_keys,
    };

    let result = state.storage.list_objects_v2(&bucket, &params).await?;
    let xml = build_list_objects_v2_xml(
        &bucket,
        &params,
        continuation_token_raw.as_deref(),
        &result,
    );
    Ok(xml_response(xml))
}

/// HEAD `/{bucket}`: 200 when the bucket exists.
pub async fn head_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<Response, AppError> {
    let record = state.storage.fetch_bucket(&bucket).await?;
    let mut response = Response::new(Body::empty());
    if let Ok(region) = HeaderValue::from_str(&record.region) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(BUCKET_REGION_HEADER), region);
    }
    Ok(response)
}

/// DELETE `/{bucket}`: only empty buckets can be deleted.
pub async fn delete_bucket(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
) -> Result<StatusCode, AppError> {
    state.storage.delete_bucket(&bucket).await?;
    info!(bucket = %bucket, "bucket deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn build_list_objects_v2_xml(
    bucket: &str,
    params: &ListObjectsParams,
    continuation_token: Option<&str>,
    result: &ListObjectsResult,
) -> String {
    let mut xml = String::from(XML_DECLARATION);
    xml.push_str(&format!(r#"<ListBucketResult xmlns="{S3_XMLNS}">"#));
    xml.push_str(&format!("<Name>{}</Name>", xml_escape(bucket)));
    xml.push_str(&format!("<Prefix>{}</Prefix>", xml_escape(params.prefix())));
    xml.push_str(&format!("<MaxKeys>{}</MaxKeys>", result.max_keys));
    xml.push_str(&format!("<KeyCount>{}</KeyCount>", result.key_count));
    if let Some(token) = continuation_token {
        xml.push_str(&format!(
            "<ContinuationToken>{}</ContinuationToken>",
            xml_escape(token)
        ));
    }
    if let Some(sa) = &params.start_after {
        xml.push_str(&format!("<StartAfter>{}</StartAfter>", xml_escape(sa)));
    }
    if !params.delimiter().is_empty() {
        xml.push_str(&format!(
            "<Delimiter>{}</Delimiter>",
            xml_escape(params.delimiter())
        ));
    }
    xml.push_str(&format!(
        "<IsTruncated>{}</IsTruncated>",
        if result.is_truncated { "true" } else { "false" }
    ));
    if let Some(next) = &result.next_continuation_token {
        xml.push_str(&format!(
            "<NextContinuationToken>{}</NextContinuationToken>",
            xml_escape(&encode_continuation_token(next))
        ));
    }

    for obj in &result.objects {
        xml.push_str("<Contents>");
        xml.push_str(&format!("<Key>{}</Key>", xml_escape(&obj.key)));
        xml.push_str(&format!(
            "<LastModified>{}</LastModified>",
            obj.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
        xml.push_str(&format!("<ETag>\"{}\"</ETag>", xml_escape(&obj.etag)));
        xml.push_str(&format!("<Size>{}</Size>", obj.size));
        xml.push_str(&format!(
            "<StorageClass>{}</StorageClass>",
            xml_escape(&obj.storage_class)
        ));
        xml.push_str("</Contents>");
    }

    for prefix in &result.common_prefixes {
        xml.push_str("<CommonPrefixes><Prefix>");
        xml.push_str(&xml_escape(prefix));
        xml.push_str("</Prefix></CommonPrefixes>");
    }

    xml.push_str("</ListBucketResult>");
    xml
}

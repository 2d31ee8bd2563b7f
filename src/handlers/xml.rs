//! Small helpers shared by the XML-producing handlers.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use base64::{Engine as _, engine::general_purpose};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

pub fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// 200 response with an `application/xml` body.
pub fn xml_response(xml: String) -> Response {
    let mut response = Response::new(Body::from(xml));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    *response.status_mut() = StatusCode::OK;
    response
}

pub fn encode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD.encode(token)
}

/// Tokens that are not our base64 are taken verbatim as a key.
///
/// A raw key that happens to be valid base64 of UTF-8 is decoded rather than
/// used as is (`AAAA` becomes three NUL chars). Tokens issued by the listing
/// are always encoded, so only hand-written tokens can hit this.
pub fn decode_continuation_token(token: &str) -> String {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| token.to_string())
}

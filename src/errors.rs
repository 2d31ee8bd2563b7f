use crate::{handlers::xml::xml_escape, services::storage_service::StorageError};
use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;
use uuid::Uuid;

/// An S3-style error: HTTP status, error code and message, rendered as the
/// `<Error>` XML document S3 clients parse.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub resource: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
            resource: None,
        }
    }

    /// Attach the bucket or key the error refers to.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, msg)
    }

    pub fn malformed_xml(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "MalformedXML", msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "InvalidArgument", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }

        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Error>"#);
        xml.push_str(&format!("<Code>{}</Code>", self.code));
        xml.push_str(&format!("<Message>{}</Message>", xml_escape(&self.message)));
        if let Some(resource) = &self.resource {
            xml.push_str(&format!("<Resource>{}</Resource>", xml_escape(resource)));
        }
        xml.push_str(&format!("<RequestId>{}</RequestId>", Uuid::new_v4().simple()));
        xml.push_str("</Error>");

        let mut response = Response::new(Body::from(xml));
        *response.status_mut() = self.status;
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/xml"),
        );
        response
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        let message = err.to_string();
        match err {
            StorageError::BucketNotFound(bucket) => {
                AppError::not_found("NoSuchBucket", message).with_resource(bucket)
            }
            StorageError::ObjectNotFound { bucket, key } => {
                AppError::not_found("NoSuchKey", message).with_resource(format!("{bucket}/{key}"))
            }
            StorageError::BucketAlreadyExists(bucket) => {
                AppError::new(StatusCode::CONFLICT, "BucketAlreadyExists", message)
                    .with_resource(bucket)
            }
            StorageError::BucketNotEmpty(bucket) => {
                AppError::new(StatusCode::CONFLICT, "BucketNotEmpty", message).with_resource(bucket)
            }
            StorageError::InvalidBucketName { name, .. } => {
                AppError::new(StatusCode::BAD_REQUEST, "InvalidBucketName", message)
                    .with_resource(name)
            }
            StorageError::InvalidObjectKey => AppError::invalid_argument(message),
            StorageError::ObjectIdNotFound(_) | StorageError::Sqlx(_) => AppError::internal(message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_s3_codes() {
        let err = AppError::from(StorageError::BucketNotFound("photos".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "NoSuchBucket");
        assert_eq!(err.resource.as_deref(), Some("photos"));

        let err = AppError::from(StorageError::BucketNotEmpty("photos".into()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "BucketNotEmpty");

        let err = AppError::from(StorageError::ObjectNotFound {
            bucket: "photos".into(),
            key: "a.png".into(),
        });
        assert_eq!(err.code, "NoSuchKey");
        assert_eq!(err.resource.as_deref(), Some("photos/a.png"));

        let err = AppError::from(StorageError::ObjectIdNotFound(7));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn response_is_xml_error_document() {
        let response = AppError::malformed_xml("bad <body>").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );
    }
}

//! JSON body POSTed to notification destinations.
//!
//! Mirrors the S3 event message layout (`{"Records":[...]}`) so that
//! consumers written against S3 can parse it unchanged.

use super::{
    notification::{Event, NotificationRule},
    object::Object,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

const EVENT_VERSION: &str = "2.1";
const EVENT_SOURCE: &str = "aws:s3";
const SCHEMA_VERSION: &str = "1.0";
const PRINCIPAL_ID: &str = "s3local";
const SOURCE_IP: &str = "127.0.0.1";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventNotification {
    #[serde(rename = "Records")]
    pub records: Vec<EventRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub event_version: String,
    pub event_source: String,
    pub aws_region: String,
    pub event_time: String,
    pub event_name: String,
    pub user_identity: UserIdentity,
    pub request_parameters: RequestParameters,
    pub response_elements: ResponseElements,
    pub s3: S3Entity,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub principal_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestParameters {
    #[serde(rename = "sourceIPAddress")]
    pub source_ip_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResponseElements {
    #[serde(rename = "x-amz-request-id")]
    pub request_id: String,
    #[serde(rename = "x-amz-id-2")]
    pub id_2: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct S3Entity {
    pub s3_schema_version: String,
    pub configuration_id: String,
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct S3Bucket {
    pub name: String,
    pub owner_identity: UserIdentity,
    pub arn: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct S3Object {
    pub key: String,
    pub size: i64,
    #[serde(rename = "eTag")]
    pub etag: String,
    pub sequencer: String,
}

impl EventNotification {
    /// Build the single-record message for one (event, rule) match.
    pub fn for_object(event: &Event, rule: &NotificationRule, object: &Object, region: &str) -> Self {
        let sequencer = format!("{:016x}", event.id);
        let record = EventRecord {
            event_version: EVENT_VERSION.into(),
            event_source: EVENT_SOURCE.into(),
            aws_region: region.to_string(),
            event_time: event.event_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            event_name: event.event_type.clone(),
            user_identity: UserIdentity {
                principal_id: PRINCIPAL_ID.into(),
            },
            request_parameters: RequestParameters {
                source_ip_address: SOURCE_IP.into(),
            },
            response_elements: ResponseElements {
                request_id: event.id.to_string(),
                id_2: sequencer.clone(),
            },
            s3: S3Entity {
                s3_schema_version: SCHEMA_VERSION.into(),
                configuration_id: rule.id.to_string(),
                bucket: S3Bucket {
                    name: event.bucket_name.clone(),
                    owner_identity: UserIdentity {
                        principal_id: PRINCIPAL_ID.into(),
                    },
                    arn: format!("arn:aws:s3:::{}", event.bucket_name),
                },
                object: S3Object {
                    key: object.key.clone(),
                    size: object.size,
                    etag: object.etag.clone(),
                    sequencer,
                },
            },
        };

        Self {
            records: vec![record],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::notification::{DestinationKind, OBJECT_CREATED_PUT};
    use chrono::{TimeZone, Utc};

    #[test]
    fn serializes_with_s3_field_names() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let event = Event {
            id: 42,
            bucket_name: "photos".into(),
            object_id: 7,
            object_key: "img/a.png".into(),
            event_type: OBJECT_CREATED_PUT.into(),
            event_time: at,
        };
        let rule = NotificationRule {
            id: 3,
            bucket_name: "photos".into(),
            event_type: OBJECT_CREATED_PUT.into(),
            destination_type: DestinationKind::Lambda,
            destination_address: "http://localhost:9000/".into(),
            filter_prefix: None,
            filter_suffix: None,
            enabled: true,
            created_at: at,
        };
        let object = Object {
            id: 7,
            bucket_name: "photos".into(),
            key: "img/a.png".into(),
            size: 5,
            content_type: "image/png".into(),
            etag: "5d41402abc4b2a76b9719d911017c592".into(),
            content_encoding: None,
            content_disposition: None,
            cache_control: None,
            storage_class: "STANDARD".into(),
            created_at: at,
            updated_at: at,
        };

        let msg = EventNotification::for_object(&event, &rule, &object, "us-east-1");
        let value = serde_json::to_value(&msg).unwrap();
        let record = &value["Records"][0];

        assert_eq!(record["eventVersion"], "2.1");
        assert_eq!(record["eventSource"], "aws:s3");
        assert_eq!(record["awsRegion"], "us-east-1");
        assert_eq!(record["eventTime"], "2025-01-02T03:04:05.000Z");
        assert_eq!(record["eventName"], "s3:ObjectCreated:Put");
        assert_eq!(record["requestParameters"]["sourceIPAddress"], "127.0.0.1");
        assert_eq!(record["responseElements"]["x-amz-request-id"], "42");
        assert_eq!(record["s3"]["configurationId"], "3");
        assert_eq!(record["s3"]["bucket"]["arn"], "arn:aws:s3:::photos");
        assert_eq!(record["s3"]["object"]["key"], "img/a.png");
        assert_eq!(record["s3"]["object"]["size"], 5);
        assert_eq!(record["s3"]["object"]["eTag"], "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(record["s3"]["object"]["sequencer"], "000000000000002a");
    }
}

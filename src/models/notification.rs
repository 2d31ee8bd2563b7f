//! Notification rules, recorded events and delivery jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// Event name recorded after a successful object put.
pub const OBJECT_CREATED_PUT: &str = "s3:ObjectCreated:Put";

/// Event name recorded after a successful object delete.
pub const OBJECT_REMOVED_DELETE: &str = "s3:ObjectRemoved:Delete";

/// Kind of object mutation observed by the write path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Put,
    Delete,
}

impl MutationKind {
    pub fn event_name(self) -> &'static str {
        match self {
            MutationKind::Put => OBJECT_CREATED_PUT,
            MutationKind::Delete => OBJECT_REMOVED_DELETE,
        }
    }
}

/// Configuration flavour a rule was declared with.
///
/// S3 distinguishes queues, topics and functions; locally all of them are
/// plain HTTP endpoints, so the flavour is only kept to render the
/// configuration back the way it was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum DestinationKind {
    Sqs,
    Sns,
    Lambda,
}

impl DestinationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DestinationKind::Sqs => "sqs",
            DestinationKind::Sns => "sns",
            DestinationKind::Lambda => "lambda",
        }
    }
}

/// Where matched events are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// JSON POST to an HTTP(S) address.
    Webhook { kind: DestinationKind, address: String },
}

impl Destination {
    pub fn webhook(kind: DestinationKind, address: impl Into<String>) -> Self {
        Destination::Webhook {
            kind,
            address: address.into(),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Webhook { kind, .. } => *kind,
        }
    }

    pub fn address(&self) -> &str {
        match self {
            Destination::Webhook { address, .. } => address,
        }
    }
}

/// A persisted notification rule of a bucket.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct NotificationRule {
    pub id: i64,
    pub bucket_name: String,

    /// Exact event name this rule subscribes to (no wildcards).
    pub event_type: String,

    pub destination_type: DestinationKind,
    pub destination_address: String,

    pub filter_prefix: Option<String>,
    pub filter_suffix: Option<String>,

    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl NotificationRule {
    pub fn destination(&self) -> Destination {
        Destination::webhook(self.destination_type, self.destination_address.clone())
    }

    /// Whether `key` passes this rule's prefix and suffix filters.
    ///
    /// Both filters are optional; when both are set both must hold.
    pub fn matches_key(&self, key: &str) -> bool {
        let prefix_ok = self
            .filter_prefix
            .as_deref()
            .is_none_or(|prefix| key.starts_with(prefix));
        let suffix_ok = self
            .filter_suffix
            .as_deref()
            .is_none_or(|suffix| key.ends_with(suffix));
        prefix_ok && suffix_ok
    }
}

/// A rule to be inserted by `NotificationService::replace_rules`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotificationRule {
    pub event_type: String,
    pub destination: Destination,
    pub filter_prefix: Option<String>,
    pub filter_suffix: Option<String>,
}

/// One observed object mutation. Append-only.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Event {
    /// Monotonic identifier.
    pub id: i64,
    pub bucket_name: String,
    pub object_id: i64,
    /// Key at the time of the mutation.
    pub object_key: String,
    pub event_type: String,
    pub event_time: DateTime<Utc>,
}

/// Delivery state of a job. Only ever moves forward out of `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A delivery record for one (event, rule) match.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct NotificationJob {
    pub id: i64,
    pub event_id: i64,
    pub notification_rule_id: i64,
    pub status: JobStatus,
    pub attempts: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(prefix: Option<&str>, suffix: Option<&str>) -> NotificationRule {
        NotificationRule {
            id: 1,
            bucket_name: "photos".into(),
            event_type: OBJECT_CREATED_PUT.into(),
            destination_type: DestinationKind::Sqs,
            destination_address: "http://localhost/hook".into(),
            filter_prefix: prefix.map(str::to_string),
            filter_suffix: suffix.map(str::to_string),
            enabled: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn key_filters_apply_independently() {
        assert!(rule(None, None).matches_key("anything"));
        assert!(rule(Some("img/"), None).matches_key("img/a.png"));
        assert!(!rule(Some("img/"), None).matches_key("docs/a.png"));
        assert!(rule(None, Some(".png")).matches_key("docs/a.png"));
        assert!(!rule(None, Some(".png")).matches_key("docs/a.jpg"));
    }

    #[test]
    fn both_filters_must_hold() {
        let r = rule(Some("img/"), Some(".png"));
        assert!(r.matches_key("img/a.png"));
        assert!(!r.matches_key("img/a.jpg"));
        assert!(!r.matches_key("docs/a.png"));
    }

    #[test]
    fn rule_destination_is_a_webhook() {
        let d = rule(None, None).destination();
        assert_eq!(d.kind(), DestinationKind::Sqs);
        assert_eq!(d.address(), "http://localhost/hook");
    }
}

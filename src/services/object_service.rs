//! Object writes with event emission.
//!
//! Every successful put or delete is followed, in the same request, by an
//! event row and the matching notification jobs. The three steps are not
//! one transaction: a failure after the object write reports the request
//! as failed but leaves the write committed.

use crate::{
    models::{
        metadata::PutObjectOptions,
        notification::{Event, MutationKind, NotificationJob},
        object::Object,
    },
    services::{
        event_service::EventRecorder, notification_service::NotificationService,
        storage_service::{StorageResult, StorageService},
    },
};
use tracing::{error, info};

#[derive(Clone)]
pub struct ObjectService {
    storage: StorageService,
    events: EventRecorder,
    notifications: NotificationService,
}

impl ObjectService {
    pub fn new(
        storage: StorageService,
        events: EventRecorder,
        notifications: NotificationService,
    ) -> Self {
        Self {
            storage,
            events,
            notifications,
        }
    }

    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        payload: &[u8],
        options: PutObjectOptions,
    ) -> StorageResult<Object> {
        let object = self.storage.put_object(bucket, key, payload, options).await?;
        self.publish(bucket, object.id, key, MutationKind::Put).await?;
        Ok(object)
    }

    /// Delete `key`; an event is only emitted when a row was removed.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<Option<Object>> {
        let deleted = self.storage.delete_object(bucket, key).await?;
        if let Some(object) = &deleted {
            self.publish(bucket, object.id, key, MutationKind::Delete).await?;
        }
        Ok(deleted)
    }

    async fn publish(
        &self,
        bucket: &str,
        object_id: i64,
        key: &str,
        kind: MutationKind,
    ) -> StorageResult<(Event, Vec<NotificationJob>)> {
        let event = self
            .events
            .record_mutation(bucket, object_id, key, kind)
            .await
            .inspect_err(|err| {
                error!(bucket = %bucket, key = %key, "failed to record event: {}", err)
            })?;

        let jobs = self
            .notifications
            .match_event(&event)
            .await
            .inspect_err(|err| {
                error!(event_id = event.id, "failed to create notification jobs: {}", err)
            })?;

        if !jobs.is_empty() {
            info!(event_id = event.id, jobs = jobs.len(), "notification jobs queued");
        }
        Ok((event, jobs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::notification::{
        Destination, DestinationKind, JobStatus, NewNotificationRule, OBJECT_CREATED_PUT,
        OBJECT_REMOVED_DELETE,
    };
    use sqlx::SqlitePool;
    use std::sync::Arc;

    async fn setup() -> (ObjectService, NotificationService, Arc<SqlitePool>) {
        let db = Arc::new(test_pool().await);
        let storage = StorageService::new(db.clone());
        storage.create_bucket("photos", "us-east-1").await.unwrap();
        let notifications = NotificationService::new(db.clone());
        let service = ObjectService::new(storage, EventRecorder::new(db.clone()), notifications.clone());
        (service, notifications, db)
    }

    async fn event_types(db: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT event_type FROM events ORDER BY id")
            .fetch_all(db)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn put_and_delete_emit_events() {
        let (service, _, db) = setup().await;
        service
            .put_object("photos", "a.png", b"png", PutObjectOptions::default())
            .await
            .unwrap();
        assert!(service.delete_object("photos", "a.png").await.unwrap().is_some());
        assert!(service.delete_object("photos", "a.png").await.unwrap().is_none());

        assert_eq!(event_types(&db).await, vec![OBJECT_CREATED_PUT, OBJECT_REMOVED_DELETE]);
    }

    #[tokio::test]
    async fn failed_write_emits_nothing() {
        let (service, _, db) = setup().await;
        assert!(
            service
                .put_object("missing", "a.png", b"png", PutObjectOptions::default())
                .await
                .is_err()
        );
        assert!(event_types(&db).await.is_empty());
    }

    #[tokio::test]
    async fn put_queues_jobs_for_matching_rules() {
        let (service, notifications, _) = setup().await;
        notifications
            .replace_rules(
                "photos",
                &[NewNotificationRule {
                    event_type: OBJECT_CREATED_PUT.into(),
                    destination: Destination::webhook(DestinationKind::Sns, "http://127.0.0.1:1/"),
                    filter_prefix: Some("img/".into()),
                    filter_suffix: None,
                }],
            )
            .await
            .unwrap();

        service
            .put_object("photos", "img/a.png", b"1", PutObjectOptions::default())
            .await
            .unwrap();
        service
            .put_object("photos", "docs/a.png", b"2", PutObjectOptions::default())
            .await
            .unwrap();

        let pending = notifications.list_pending_jobs().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, JobStatus::Pending);
        assert_eq!(pending[0].attempts, 0);
    }
}

//! Append-only record of object mutations.

use crate::{
    models::notification::{Event, MutationKind},
    services::storage_service::StorageResult,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct EventRecorder {
    db: Arc<SqlitePool>,
}

impl EventRecorder {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Append one event for a mutation that has already been committed.
    pub async fn record_mutation(
        &self,
        bucket: &str,
        object_id: i64,
        key: &str,
        kind: MutationKind,
    ) -> StorageResult<Event> {
        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (bucket_name, object_id, object_key, event_type, event_time)
             VALUES (?, ?, ?, ?, ?)
             RETURNING id, bucket_name, object_id, object_key, event_type, event_time",
        )
        .bind(bucket)
        .bind(object_id)
        .bind(key)
        .bind(kind.event_name())
        .bind(Utc::now())
        .fetch_one(&*self.db)
        .await?;

        debug!(event_id = event.id, bucket = %bucket, key = %key, event = %event.event_type, "event recorded");
        Ok(event)
    }

    pub async fn get_event(&self, id: i64) -> StorageResult<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, bucket_name, object_id, object_key, event_type, event_time
             FROM events WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::notification::{OBJECT_CREATED_PUT, OBJECT_REMOVED_DELETE};

    #[tokio::test]
    async fn events_get_increasing_ids() {
        let recorder = EventRecorder::new(Arc::new(test_pool().await));

        let first = recorder
            .record_mutation("photos", 1, "a.png", MutationKind::Put)
            .await
            .unwrap();
        let second = recorder
            .record_mutation("photos", 1, "a.png", MutationKind::Delete)
            .await
            .unwrap();

        assert!(second.id > first.id);
        assert_eq!(first.event_type, OBJECT_CREATED_PUT);
        assert_eq!(second.event_type, OBJECT_REMOVED_DELETE);

        let loaded = recorder.get_event(first.id).await.unwrap().unwrap();
        assert_eq!(loaded.object_key, "a.png");
        assert!(recorder.get_event(999).await.unwrap().is_none());
    }
}

//! Notification rules, event matching and delivery-job bookkeeping.
//!
//! Rules are replaced wholesale per bucket. Matching runs inline on the
//! write path and only inserts `pending` jobs; delivery happens later in
//! the worker, which moves each job forward exactly once.

use crate::{
    models::notification::{Event, JobStatus, NewNotificationRule, NotificationJob, NotificationRule},
    services::storage_service::StorageResult,
};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

const RULE_COLUMNS: &str = "id, bucket_name, event_type, destination_type, destination_address, \
     filter_prefix, filter_suffix, enabled, created_at";
const JOB_COLUMNS: &str =
    "id, event_id, notification_rule_id, status, attempts, error_message, created_at, updated_at";

#[derive(Clone)]
pub struct NotificationService {
    db: Arc<SqlitePool>,
}

impl NotificationService {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Replace every rule of `bucket` with `rules` in one transaction.
    ///
    /// Jobs created under the old rules are left untouched.
    pub async fn replace_rules(
        &self,
        bucket: &str,
        rules: &[NewNotificationRule],
    ) -> StorageResult<Vec<NotificationRule>> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM notification_rules WHERE bucket_name = ?")
            .bind(bucket)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(rules.len());
        for rule in rules {
            let destination = &rule.destination;
            let row = sqlx::query_as::<_, NotificationRule>(&format!(
                "INSERT INTO notification_rules (
                    bucket_name, event_type, destination_type, destination_address,
                    filter_prefix, filter_suffix, enabled, created_at
                 ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
                 RETURNING {RULE_COLUMNS}"
            ))
            .bind(bucket)
            .bind(&rule.event_type)
            .bind(destination.kind())
            .bind(destination.address())
            .bind(&rule.filter_prefix)
            .bind(&rule.filter_suffix)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            inserted.push(row);
        }

        tx.commit().await?;
        info!(bucket = %bucket, removed, added = inserted.len(), "notification rules replaced");
        Ok(inserted)
    }

    /// All rules of a bucket in creation order.
    pub async fn list_rules(&self, bucket: &str) -> StorageResult<Vec<NotificationRule>> {
        let rules = sqlx::query_as::<_, NotificationRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM notification_rules WHERE bucket_name = ? ORDER BY id ASC"
        ))
        .bind(bucket)
        .fetch_all(&*self.db)
        .await?;
        Ok(rules)
    }

    pub async fn get_rule(&self, id: i64) -> StorageResult<Option<NotificationRule>> {
        let rule = sqlx::query_as::<_, NotificationRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM notification_rules WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(rule)
    }

    /// Create one pending job per enabled rule of the event's bucket whose
    /// event type equals the event's and whose key filters accept the key.
    ///
    /// A failure part-way leaves the jobs inserted so far in place.
    pub async fn match_event(&self, event: &Event) -> StorageResult<Vec<NotificationJob>> {
        let candidates = sqlx::query_as::<_, NotificationRule>(&format!(
            "SELECT {RULE_COLUMNS} FROM notification_rules
             WHERE bucket_name = ? AND event_type = ? AND enabled = 1
             ORDER BY id ASC"
        ))
        .bind(&event.bucket_name)
        .bind(&event.event_type)
        .fetch_all(&*self.db)
        .await?;

        let mut jobs = Vec::new();
        for rule in candidates.iter().filter(|r| r.matches_key(&event.object_key)) {
            let now = Utc::now();
            let job = sqlx::query_as::<_, NotificationJob>(&format!(
                "INSERT INTO notification_jobs (
                    event_id, notification_rule_id, status, attempts, created_at, updated_at
                 ) VALUES (?, ?, ?, 0, ?, ?)
                 RETURNING {JOB_COLUMNS}"
            ))
            .bind(event.id)
            .bind(rule.id)
            .bind(JobStatus::Pending)
            .bind(now)
            .bind(now)
            .fetch_one(&*self.db)
            .await?;
            jobs.push(job);
        }

        debug!(
            event_id = event.id,
            candidates = candidates.len(),
            matched = jobs.len(),
            "event matched against notification rules"
        );
        Ok(jobs)
    }

    /// Pending jobs in creation order.
    pub async fn list_pending_jobs(&self) -> StorageResult<Vec<NotificationJob>> {
        let jobs = sqlx::query_as::<_, NotificationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM notification_jobs WHERE status = ? ORDER BY id ASC"
        ))
        .bind(JobStatus::Pending)
        .fetch_all(&*self.db)
        .await?;
        Ok(jobs)
    }

    /// Move a pending job to `completed` or `failed` and count the attempt.
    ///
    /// Returns false if the job was no longer pending; terminal jobs are
    /// never touched again.
    pub async fn finish_job(
        &self,
        job: &NotificationJob,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> StorageResult<bool> {
        debug_assert_ne!(status, JobStatus::Pending);
        let result = sqlx::query(
            "UPDATE notification_jobs
             SET status = ?, attempts = attempts + 1, error_message = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(status)
        .bind(error_message)
        .bind(Utc::now())
        .bind(job.id)
        .bind(JobStatus::Pending)
        .execute(&*self.db)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
impl NotificationService {
    pub async fn get_job(&self, id: i64) -> StorageResult<Option<NotificationJob>> {
        let job = sqlx::query_as::<_, NotificationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM notification_jobs WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await?;
        Ok(job)
    }

    /// Jobs created for one event, in creation order.
    pub async fn jobs_for_event(&self, event_id: i64) -> StorageResult<Vec<NotificationJob>> {
        let jobs = sqlx::query_as::<_, NotificationJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM notification_jobs WHERE event_id = ? ORDER BY id ASC"
        ))
        .bind(event_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(jobs)
    }
}

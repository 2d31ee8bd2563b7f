//! Background delivery of notification jobs.
//!
//! A single task polls for `pending` jobs on a fixed interval and delivers
//! them one after another. Each job gets exactly one attempt: it ends up
//! `completed` on a 2xx answer and `failed` otherwise, and is never picked
//! up again.

use crate::{
    config::AppConfig,
    models::{
        event_message::EventNotification,
        notification::{JobStatus, NotificationJob},
    },
    services::{
        event_service::EventRecorder,
        notification_service::NotificationService,
        storage_service::{StorageResult, StorageService},
    },
    worker::delivery::{DelivererFactory, DeliveryError},
};
use sqlx::SqlitePool;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct NotificationWorker {
    storage: StorageService,
    events: EventRecorder,
    notifications: NotificationService,
    deliverers: DelivererFactory,
    poll_interval: Duration,
    region: String,
    shutdown: CancellationToken,
}

/// Handle of a spawned worker task.
pub struct WorkerHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ask the worker to stop and wait for it. A poll cycle in progress is
    /// finished first, so in-flight deliveries complete or time out.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            error!("Notification worker task ended abnormally: {}", e);
        }
    }
}

impl NotificationWorker {
    pub fn new(db: Arc<SqlitePool>, config: &AppConfig) -> Result<Self, DeliveryError> {
        Ok(Self {
            storage: StorageService::new(db.clone()),
            events: EventRecorder::new(db.clone()),
            notifications: NotificationService::new(db),
            deliverers: DelivererFactory::new(config.delivery_timeout)?,
            poll_interval: config.poll_interval,
            region: config.region.clone(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn spawn(self) -> WorkerHandle {
        let shutdown = self.shutdown.clone();
        let task = tokio::spawn(self.run());
        WorkerHandle { shutdown, task }
    }

    /// Poll until the shutdown token is cancelled.
    pub async fn run(self) {
        info!(interval_ms = self.poll_interval.as_millis() as u64, "Notification worker started");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Notification worker stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.process_pending().await {
                        error!("Error listing pending notification jobs: {}", e);
                    }
                }
            }
        }
    }

    /// Run one poll cycle. Returns the number of jobs attempted.
    pub async fn process_pending(&self) -> StorageResult<usize> {
        let jobs = self.notifications.list_pending_jobs().await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        info!("Processing {} pending notification jobs", jobs.len());
        for job in &jobs {
            self.process_job(job).await;
        }
        Ok(jobs.len())
    }

    async fn process_job(&self, job: &NotificationJob) {
        let (status, error_message) = match self.deliver(job).await {
            Ok(()) => {
                info!(job_id = job.id, "Notification delivered");
                (JobStatus::Completed, None)
            }
            Err(message) => {
                warn!(job_id = job.id, "Notification delivery failed: {}", message);
                (JobStatus::Failed, Some(message))
            }
        };

        match self
            .notifications
            .finish_job(job, status, error_message.as_deref())
            .await
        {
            Ok(true) => debug!(job_id = job.id, %status, "job status updated"),
            Ok(false) => warn!(job_id = job.id, "job was no longer pending"),
            Err(e) => error!(job_id = job.id, "Error updating job status: {}", e),
        }
    }

    /// Resolve everything the message needs and send it. The error is the
    /// diagnostic stored on the job.
    async fn deliver(&self, job: &NotificationJob) -> Result<(), String> {
        let event = self
            .events
            .get_event(job.event_id)
            .await
            .map_err(|e| format!("failed to fetch event: {e}"))?
            .ok_or_else(|| format!("event {} not found", job.event_id))?;

        let rule = self
            .notifications
            .get_rule(job.notification_rule_id)
            .await
            .map_err(|e| format!("failed to fetch notification rule: {e}"))?
            .ok_or_else(|| format!("notification rule {} not found", job.notification_rule_id))?;

        let object = self
            .storage
            .get_object_by_id(event.object_id)
            .await
            .map_err(|e| format!("failed to fetch object: {e}"))?;

        let payload = EventNotification::for_object(&event, &rule, &object, &self.region);
        let destination = rule.destination();
        debug!(
            job_id = job.id,
            destination = %destination.address(),
            event = %event.event_type,
            "delivering notification"
        );

        self.deliverers
            .for_destination(&destination)
            .deliver(&payload)
            .await
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::test_pool,
        models::{
            metadata::PutObjectOptions,
            notification::{Destination, DestinationKind, NewNotificationRule, OBJECT_CREATED_PUT},
        },
        services::object_service::ObjectService,
    };
    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use serde_json::Value;
    use tokio::{net::TcpListener, sync::Mutex};

    type Received = Arc<Mutex<Vec<Value>>>;

    /// Local webhook endpoint answering every POST with `status`.
    async fn sink(status: StatusCode) -> (String, Received) {
        slow_sink(status, Duration::ZERO).await
    }

    /// Like `sink`, but records the body and then waits `delay` before
    /// answering.
    async fn slow_sink(status: StatusCode, delay: Duration) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/hook",
                post(
                    move |State((store, status)): State<(Received, StatusCode)>, Json(body): Json<Value>| async move {
                        store.lock().await.push(body);
                        tokio::time::sleep(delay).await;
                        status
                    },
                ),
            )
            .with_state((received.clone(), status));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), received)
    }

    struct Fixture {
        objects: ObjectService,
        storage: StorageService,
        notifications: NotificationService,
        worker: NotificationWorker,
    }

    async fn fixture(endpoints: &[&str]) -> Fixture {
        fixture_with_timeout(endpoints, Duration::from_secs(2)).await
    }

    async fn fixture_with_timeout(endpoints: &[&str], delivery_timeout: Duration) -> Fixture {
        let db = Arc::new(test_pool().await);
        let storage = StorageService::new(db.clone());
        storage.create_bucket("photos", "us-east-1").await.unwrap();

        let notifications = NotificationService::new(db.clone());
        let rules: Vec<NewNotificationRule> = endpoints
            .iter()
            .map(|endpoint| NewNotificationRule {
                event_type: OBJECT_CREATED_PUT.into(),
                destination: Destination::webhook(DestinationKind::Sqs, *endpoint),
                filter_prefix: None,
                filter_suffix: None,
            })
            .collect();
        notifications.replace_rules("photos", &rules).await.unwrap();

        let config = AppConfig {
            poll_interval: Duration::from_millis(20),
            delivery_timeout,
            ..AppConfig::default()
        };
        Fixture {
            objects: ObjectService::new(storage.clone(), EventRecorder::new(db.clone()), notifications.clone()),
            storage,
            notifications,
            worker: NotificationWorker::new(db, &config).unwrap(),
        }
    }

    async fn put(f: &Fixture, key: &str) {
        f.objects
            .put_object("photos", key, b"hello", PutObjectOptions::default())
            .await
            .unwrap();
    }

    async fn only_job(f: &Fixture) -> NotificationJob {
        let jobs: Vec<NotificationJob> = sqlx::query_as("SELECT * FROM notification_jobs")
            .fetch_all(&*f.storage.db)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        jobs.into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn successful_delivery_completes_job() {
        let (endpoint, received) = sink(StatusCode::OK).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "img/a.png").await;

        assert_eq!(f.worker.process_pending().await.unwrap(), 1);

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message, None);

        let bodies = received.lock().await;
        assert_eq!(bodies.len(), 1);
        let record = &bodies[0]["Records"][0];
        assert_eq!(record["eventName"], OBJECT_CREATED_PUT);
        assert_eq!(record["awsRegion"], "us-east-1");
        assert_eq!(record["s3"]["bucket"]["name"], "photos");
        assert_eq!(record["s3"]["object"]["key"], "img/a.png");
        assert_eq!(record["s3"]["object"]["size"], 5);
        assert_eq!(record["s3"]["object"]["eTag"], "5d41402abc4b2a76b9719d911017c592");
    }

    #[tokio::test]
    async fn server_error_fails_job_without_retry() {
        let (endpoint, received) = sink(StatusCode::INTERNAL_SERVER_ERROR).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "a.png").await;

        f.worker.process_pending().await.unwrap();
        assert_eq!(f.worker.process_pending().await.unwrap(), 0);
        assert_eq!(f.worker.process_pending().await.unwrap(), 0);

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("HTTP 500"));
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_destination_fails_job() {
        let f = fixture(&["http://127.0.0.1:1/hook"]).await;
        put(&f, "a.png").await;

        f.worker.process_pending().await.unwrap();

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        let message = job.error_message.unwrap();
        assert!(message.starts_with("HTTP request"), "{message}");
    }

    #[tokio::test]
    async fn deleted_object_fails_job() {
        let (endpoint, received) = sink(StatusCode::OK).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "a.png").await;
        f.storage.delete_object("photos", "a.png").await.unwrap();

        f.worker.process_pending().await.unwrap();

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().starts_with("failed to fetch object"));
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn removed_rule_fails_job() {
        let (endpoint, received) = sink(StatusCode::OK).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "a.png").await;
        f.notifications.replace_rules("photos", &[]).await.unwrap();

        f.worker.process_pending().await.unwrap();

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.unwrap().contains("notification rule"));
        assert!(received.lock().await.is_empty());
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_cycle() {
        let (endpoint, received) = sink(StatusCode::NO_CONTENT).await;
        let f = fixture(&["http://127.0.0.1:1/hook", &endpoint]).await;
        put(&f, "a.png").await;

        assert_eq!(f.worker.process_pending().await.unwrap(), 2);

        let statuses: Vec<JobStatus> = sqlx::query_scalar("SELECT status FROM notification_jobs ORDER BY id")
            .fetch_all(&*f.storage.db)
            .await
            .unwrap();
        assert_eq!(statuses, vec![JobStatus::Failed, JobStatus::Completed]);
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn spawned_worker_delivers_and_stops() {
        let (endpoint, received) = sink(StatusCode::OK).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "a.png").await;

        let Fixture {
            worker,
            notifications,
            ..
        } = f;
        let handle = worker.spawn();

        let mut delivered = false;
        for _ in 0..100 {
            if notifications.list_pending_jobs().await.unwrap().is_empty() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(delivered);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("worker should stop after cancellation");
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn slow_destination_times_out_once() {
        let (endpoint, received) = slow_sink(StatusCode::OK, Duration::from_secs(2)).await;
        let f = fixture_with_timeout(&[&endpoint], Duration::from_millis(300)).await;
        put(&f, "a.png").await;

        assert_eq!(f.worker.process_pending().await.unwrap(), 1);
        assert_eq!(f.worker.process_pending().await.unwrap(), 0);

        let job = only_job(&f).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.error_message.as_deref(), Some("HTTP request timed out"));
        assert_eq!(received.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_delivery() {
        let (endpoint, received) = slow_sink(StatusCode::OK, Duration::from_millis(500)).await;
        let f = fixture(&[&endpoint]).await;
        put(&f, "a.png").await;

        let Fixture { worker, storage, .. } = f;
        let handle = worker.spawn();

        let mut in_flight = false;
        for _ in 0..100 {
            if !received.lock().await.is_empty() {
                in_flight = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(in_flight);

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("worker should stop after the delivery finishes");

        let jobs: Vec<NotificationJob> = sqlx::query_as("SELECT * FROM notification_jobs")
            .fetch_all(&*storage.db)
            .await
            .unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert_eq!(jobs[0].attempts, 1);
        assert_eq!(received.lock().await.len(), 1);
    }
}

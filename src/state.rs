use crate::{
    config::AppConfig,
    services::{
        event_service::EventRecorder, notification_service::NotificationService,
        object_service::ObjectService, storage_service::StorageService,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    /// Object writes that also emit events and notification jobs.
    pub objects: ObjectService,
    pub notifications: NotificationService,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: Arc<SqlitePool>, config: AppConfig) -> Self {
        let storage = StorageService::new(db.clone());
        let notifications = NotificationService::new(db.clone());
        let objects = ObjectService::new(
            storage.clone(),
            EventRecorder::new(db),
            notifications.clone(),
        );
        Self {
            storage,
            objects,
            notifications,
            config: Arc::new(config),
        }
    }
}

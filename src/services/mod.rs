//! Service layer: persistence, listing and the notification pipeline.

pub mod event_service;
pub mod listing;
pub mod notification_service;
pub mod object_service;
pub mod storage_service;

//! Core data models for the local S3 emulator.
//!
//! Buckets and objects map to SQLite tables via `sqlx::FromRow`; the
//! notification models carry the event pipeline (rules → events → jobs)
//! and the wire documents it reads and emits.

pub mod bucket;
pub mod event_message;
pub mod metadata;
pub mod notification;
pub mod notification_config;
pub mod object;

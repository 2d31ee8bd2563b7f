pub mod delivery;
pub mod notification_worker;

pub mod bucket_handlers;
pub mod health_handlers;
pub mod object_handlers;
pub mod xml;

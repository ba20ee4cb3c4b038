//! Background tasks.

pub mod notification_scheduler;

//! Background services

pub mod presenter;
pub mod scheduler;

pub use scheduler::{AccountScheduler, AttemptOutcome, SchedulerHandle, SchedulerSettings};

//! # Freightbot Notify
//! The notification subsystem: the engine computes deduplicated due
//! reminders from stored lifecycle dates, the dispatcher fans them out to
//! the messaging transport, and the scheduler drives both on a fixed
//! cadence independent of the command-handling path.

pub mod dispatch;
pub mod engine;
pub mod scheduler;

pub use dispatch::{DeliveryOutcome, Dispatcher};
pub use engine::NotificationEngine;
pub use scheduler::{Scheduler, TickReport};

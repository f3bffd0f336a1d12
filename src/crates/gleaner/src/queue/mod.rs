//! Durable task queue, worker loop, stuck-task monitoring, and dead-letter
//! triage.

pub mod durable;
pub mod heartbeat;
pub mod triage;
pub mod worker;

pub use durable::{DurableQueue, EnqueueOptions, TaskRecord, TaskStatus};

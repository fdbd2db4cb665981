//! Bounded-concurrency job queue.
//!
//! This crate provides:
//! - The scheduler: FIFO admission under a concurrency cap, cascading
//!   admission on completion, best-effort cancellation, retention sweep
//! - Per-job progress fan-out over broadcast topics
//! - The opaque `JobRunner` boundary the actual work plugs into

pub mod error;
pub mod progress;
pub mod runner;
pub mod scheduler;

pub use error::{QueueError, QueueResult};
pub use progress::{JobProgress, ProgressHub};
pub use runner::{CancelSignal, JobRunner, RunContext};
pub use scheduler::{JobOverview, QueueStats, QueuedJob, Scheduler, SchedulerConfig};

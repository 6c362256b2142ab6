//! Durable transcode job queue.
//!
//! This crate provides:
//! - Priority, delayed and retried delivery with bounded history (Redis and
//!   in-process implementations behind `WorkQueue`)
//! - Lease-based claiming, so a crashed worker's job is delivered again
//! - Job events via Redis Pub/Sub behind `JobEventSink`

pub mod error;
pub mod events;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use events::{JobEventSink, MemoryEventSink, ProgressChannel, EVENTS_CHANNEL};
pub use job::{Backoff, JobOptions, JobSummary, QueuedJob, TranscodeJob, MAX_PRIORITY};
pub use memory::MemoryQueue;
pub use queue::{Claim, FailureOutcome, QueueConfig, QueueCounts, WorkQueue, STALLED_ERROR};
pub use redis_queue::RedisQueue;

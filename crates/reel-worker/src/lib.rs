//! Transcode-and-publish worker.
//!
//! This crate provides:
//! - Job executor with lease heartbeats, retry reporting and graceful shutdown
//! - The local transcode pipeline (probe, extract, encode, publish)
//! - The managed Mux pipeline
//! - Per-job scratch workspaces
//! - Structured job logging and Prometheus metrics

pub mod config;
pub mod encoder;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod logging;
pub mod managed;
pub mod metrics;
pub mod pipeline;
pub mod processor;
pub mod publisher;
pub mod workspace;

pub use config::{PipelineMode, WorkerConfig};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use managed::ManagedPipeline;
pub use pipeline::TranscodePipeline;
pub use processor::{JobProcessor, ProgressReporter};
pub use publisher::ArtifactPublisher;
pub use workspace::JobWorkspace;

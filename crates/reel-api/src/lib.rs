//! Axum ingestion API.
//!
//! This crate provides:
//! - Multipart upload ingestion that enqueues transcode jobs
//! - Health and readiness probes
//! - Request logging, CORS and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;

//! Axum HTTP API server.
//!
//! This crate provides:
//! - The status/result facade ([`AnalysisService`]) over registry, executor
//!   and result store
//! - Upload, submit, poll, fetch and cancel endpoints
//! - Retention sweeping of finished jobs
//! - Rate limiting, security headers and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, ResultBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{AnalysisService, JobStatusView, RetentionSweeper, ServiceError, ServiceResult};
pub use state::AppState;

//! Job executor for video analysis.
//!
//! This crate provides:
//! - A pluggable [`WorkloadStep`] pipeline and the mock analysis workload
//! - [`JobExecutor`]: one supervised background task per job, bounded
//!   concurrency, per-job timeout, cancellation and panic containment
//! - Structured job logging

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod workload;

pub use config::{PhaseDelays, WorkerConfig};
pub use error::{WorkerError, WorkerResult, WorkloadError};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use workload::{mock_analysis, Workload, WorkloadContext, WorkloadStep};

//! Worker error types.

use std::time::Duration;

use thiserror::Error;
use vsent_models::{DocumentError, JobId};
use vsent_registry::RegistryError;
use vsent_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Error raised by a single workload step.
#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkloadError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Reasons a job ends in `Failed`, plus executor-level errors.
///
/// The `Display` text of the variant a job fails with becomes its
/// `error_detail`.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("{step} failed: {source}")]
    Step {
        step: String,
        #[source]
        source: WorkloadError,
    },

    #[error("Workload produced no result document")]
    MissingOutput,

    #[error("Workload produced an invalid result document: {0}")]
    InvalidOutput(#[from] DocumentError),

    #[error("Failed to save results: {0}")]
    Storage(#[from] StorageError),

    #[error("Job timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Job cancelled")]
    Cancelled,

    #[error("Workload panicked: {0}")]
    Panicked(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Job {0} is already running")]
    AlreadyRunning(JobId),
}

impl WorkerError {
    pub fn step(step: impl Into<String>, source: WorkloadError) -> Self {
        Self::Step {
            step: step.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Step { .. } => "step",
            Self::MissingOutput => "missing_output",
            Self::InvalidOutput(_) => "invalid_output",
            Self::Storage(_) => "storage",
            Self::TimedOut(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked(_) => "panic",
            Self::Registry(_) => "registry",
            Self::ShuttingDown => "shutdown",
            Self::AlreadyRunning(_) => "already_running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_text() {
        let err = WorkerError::step("Transcribing audio", WorkloadError::failed("decoder crashed"));
        assert_eq!(err.to_string(), "Transcribing audio failed: decoder crashed");
        assert_eq!(
            WorkerError::TimedOut(Duration::from_secs(30)).to_string(),
            "Job timed out after 30s"
        );
        assert!(WorkerError::Cancelled.to_string().contains("cancelled"));
    }
}

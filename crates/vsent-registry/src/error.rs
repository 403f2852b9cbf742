//! Registry error types.

use thiserror::Error;

use vsent_models::{JobId, TransitionError};

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Rejected update for job {job_id}: {source}")]
    InvalidTransition {
        job_id: JobId,
        #[source]
        source: TransitionError,
    },
}

impl RegistryError {
    pub fn not_found(job_id: &JobId) -> Self {
        Self::NotFound(job_id.clone())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

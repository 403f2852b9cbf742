//! Status/result facade over the registry, executor and result store.
//!
//! This is the only path outside callers use: HTTP handlers never touch the
//! registry or the store directly.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use vsent_models::{AnalysisDocument, Job, JobId, JobStatus, ResultRef, SourceRef};
use vsent_registry::JobRegistry;
use vsent_storage::{ResultStore, StorageError, StorageResult};
use vsent_worker::JobExecutor;

use crate::metrics;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Result requested before completion; poll again later.
    #[error("Job {job_id} is {status}, result not ready")]
    NotReady { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} failed: {detail}")]
    JobFailed { job_id: JobId, detail: String },

    #[error("Job {job_id} already {status}")]
    AlreadyFinished { job_id: JobId, status: JobStatus },

    /// Registered but its worker task has not been started yet.
    #[error("Job {0} is starting, retry shortly")]
    Starting(JobId),

    #[error("Too many pending jobs (limit {limit})")]
    Overloaded { limit: usize },

    #[error("{0}")]
    Unavailable(String),

    #[error("Result store error: {0}")]
    Store(#[from] StorageError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }
}

/// Poll response for one job.
///
/// `result_ref` and `result_path` are only present once the job is
/// `Completed`; the document itself is fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub current_step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<ResultRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        let completed = job.status == JobStatus::Completed;
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress,
            current_step: job.current_step.clone(),
            error_detail: job.error_detail.clone(),
            result_ref: completed.then(|| job.result_ref.clone()),
            result_path: completed.then(|| format!("/api/results/{}", job.id)),
        }
    }
}

/// Submits analysis jobs and answers status and result queries.
#[derive(Clone)]
pub struct AnalysisService {
    registry: Arc<JobRegistry>,
    executor: JobExecutor,
    results: ResultStore,
    max_pending_jobs: usize,
}

impl AnalysisService {
    pub fn new(
        registry: Arc<JobRegistry>,
        executor: JobExecutor,
        results: ResultStore,
        max_pending_jobs: usize,
    ) -> Self {
        Self {
            registry,
            executor,
            results,
            max_pending_jobs,
        }
    }

    /// Create a job for `source` and start it in the background.
    ///
    /// Returns as soon as the job is registered. The pending-job limit is a
    /// soft cap: concurrent submissions may briefly overshoot it.
    pub fn submit(&self, source: SourceRef) -> ServiceResult<JobId> {
        if self.executor.is_shutting_down() {
            return Err(ServiceError::Unavailable("Server is shutting down".to_string()));
        }
        if self.max_pending_jobs > 0 && self.registry.active_count() >= self.max_pending_jobs {
            warn!(limit = self.max_pending_jobs, "Refusing submission, too many pending jobs");
            return Err(ServiceError::Overloaded {
                limit: self.max_pending_jobs,
            });
        }

        let job_id = self
            .registry
            .create_with(source.clone(), |id| ResultRef::for_job(id, &source));

        if let Err(e) = self.executor.launch(&job_id) {
            warn!(job_id = %job_id, "Failed to launch job: {}", e);
            if let Err(update) = self.registry.update(&job_id, |job| job.fail(e.to_string())) {
                warn!(job_id = %job_id, "Could not record launch failure: {}", update);
            }
            return Err(ServiceError::Unavailable(e.to_string()));
        }

        metrics::record_job_submitted();
        info!(job_id = %job_id, source_ref = %source, "Submitted analysis job");
        Ok(job_id)
    }

    /// Current status of a job.
    pub fn poll(&self, job_id: &JobId) -> ServiceResult<JobStatusView> {
        Ok(JobStatusView::from(&self.job(job_id)?))
    }

    /// Status views of all tracked jobs, newest first.
    pub fn list(&self) -> Vec<JobStatusView> {
        self.registry.list().iter().map(JobStatusView::from).collect()
    }

    /// Result document of a completed job.
    pub async fn fetch_result(&self, job_id: &JobId) -> ServiceResult<AnalysisDocument> {
        let job = self.job(job_id)?;
        match job.status {
            JobStatus::Completed => Ok(self.results.load(&job.result_ref).await?),
            JobStatus::Failed => Err(ServiceError::JobFailed {
                job_id: job.id,
                detail: job.error_detail.unwrap_or_default(),
            }),
            status => Err(ServiceError::NotReady {
                job_id: job.id,
                status,
            }),
        }
    }

    /// Ask a live job to stop. The job ends `Failed` shortly after.
    pub fn cancel(&self, job_id: &JobId) -> ServiceResult<JobStatusView> {
        let job = self.job(job_id)?;
        if !job.is_terminal() && self.executor.cancel(job_id) {
            info!(job_id = %job_id, "Cancellation requested");
            return Ok(JobStatusView::from(&job));
        }

        // No token means either the job has finished or `submit` has not launched it yet
        let current = self.job(job_id)?;
        if current.is_terminal() {
            Err(ServiceError::AlreadyFinished {
                job_id: current.id,
                status: current.status,
            })
        } else {
            Err(ServiceError::Starting(current.id))
        }
    }

    /// Drop finished jobs older than `ttl`. Result documents are kept.
    pub fn evict_finished(&self, ttl: chrono::Duration) -> usize {
        self.registry.evict_finished(ttl)
    }

    /// Number of tracked jobs and how many of them are not yet terminal.
    pub fn job_counts(&self) -> (usize, usize) {
        (self.registry.len(), self.registry.active_count())
    }

    pub fn is_shutting_down(&self) -> bool {
        self.executor.is_shutting_down()
    }

    /// Verify the result store is reachable.
    pub async fn check_store(&self) -> StorageResult<&'static str> {
        let backend = self.results.backend();
        backend.check_connectivity().await?;
        Ok(backend.backend())
    }

    /// Stop accepting work and wind down in-flight jobs.
    pub async fn shutdown(&self) -> bool {
        self.executor.shutdown().await
    }

    fn job(&self, job_id: &JobId) -> ServiceResult<Job> {
        self.registry
            .get(job_id)
            .map_err(|_| ServiceError::NotFound(job_id.clone()))
    }
}

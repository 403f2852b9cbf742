//! Pluggable workload pipeline.
//!
//! A [`Workload`] is an ordered list of [`WorkloadStep`]s. Before a step
//! runs, its progress and label are published to the registry, so a poller
//! always sees the phase currently in flight. The last step leaves the
//! result document in [`WorkloadContext::output`].

mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use vsent_models::{AnalysisDocument, Job, JobId, SourceRef};
use vsent_registry::JobRegistry;

use crate::error::{WorkerError, WorkloadError};
use crate::logging::JobLogger;

pub use mock::{mock_analysis, MOCK_DURATION_SECS};

/// State handed from step to step while a job runs.
#[derive(Debug)]
pub struct WorkloadContext {
    pub job_id: JobId,
    pub source_ref: SourceRef,
    /// Display name of the payload (source stem)
    pub filename: String,
    /// Result document, filled in by the steps
    pub output: Option<AnalysisDocument>,
    cancel: CancellationToken,
}

impl WorkloadContext {
    pub fn new(job: &Job, cancel: CancellationToken) -> Self {
        Self {
            job_id: job.id.clone(),
            source_ref: job.source_ref.clone(),
            filename: job.source_ref.stem(),
            output: None,
            cancel,
        }
    }

    /// Whether the job has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// One phase of a workload.
#[async_trait]
pub trait WorkloadStep: Send + Sync {
    /// Label published as the job's `current_step`.
    fn label(&self) -> &str;

    /// Progress published when the step starts.
    fn progress(&self) -> u8;

    async fn execute(&self, ctx: &mut WorkloadContext) -> Result<(), WorkloadError>;
}

/// Ordered sequence of steps.
#[derive(Clone, Default)]
pub struct Workload {
    steps: Vec<Arc<dyn WorkloadStep>>,
}

impl std::fmt::Debug for Workload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.steps.iter().map(|s| (s.label(), s.progress())))
            .finish()
    }
}

impl Workload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn step(mut self, step: impl WorkloadStep + 'static) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Append all steps of `other`.
    pub fn then(mut self, other: Workload) -> Self {
        self.steps.extend(other.steps);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Labels of all steps, in order.
    pub fn labels(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.label()).collect()
    }

    /// Run every step against `ctx` and return the produced document.
    ///
    /// Cancellation is checked at each step boundary. A step whose declared
    /// progress is lower than what was already published is refused by the
    /// registry and fails the job.
    pub async fn run(
        &self,
        registry: &JobRegistry,
        mut ctx: WorkloadContext,
        logger: &JobLogger,
    ) -> Result<AnalysisDocument, WorkerError> {
        for step in &self.steps {
            if ctx.is_cancelled() {
                return Err(WorkerError::Cancelled);
            }

            let progress = step.progress();
            registry.update(&ctx.job_id, |job| job.advance(progress, step.label()))?;
            logger.log_progress(progress, step.label());

            step.execute(&mut ctx)
                .await
                .map_err(|e| WorkerError::step(step.label(), e))?;
        }

        if ctx.is_cancelled() {
            return Err(WorkerError::Cancelled);
        }
        ctx.output.take().ok_or(WorkerError::MissingOutput)
    }
}

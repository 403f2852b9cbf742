//! Job definitions and lifecycle transitions.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::utils::sanitize_filename;

/// Step label for a freshly created job.
pub const STEP_RECEIVED: &str = "File received";
/// Step label published while the result document is written.
pub const STEP_SAVING: &str = "Saving results";
/// Step label of a completed job.
pub const STEP_COMPLETED: &str = "Analysis completed";
/// Progress published while the result document is written.
pub const PROGRESS_SAVING: u8 = 90;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Opaque reference to the input payload of a job (a path or handle).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub String);

impl SourceRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem of the reference, used as the display name of the payload.
    ///
    /// `uploads/abc_clip.mp4` yields `abc_clip`; a bare handle such as `clip1`
    /// is returned unchanged.
    pub fn stem(&self) -> String {
        Path::new(&self.0)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.0)
            .to_string()
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to the location of a job's result document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultRef(pub String);

impl ResultRef {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Result location for a job: `{job_id}/r-{source stem}.json`.
    ///
    /// Namespacing by job id keeps two jobs over the same source from
    /// writing to the same location.
    pub fn for_job(job_id: &JobId, source: &SourceRef) -> Self {
        Self(format!(
            "{}/r-{}.json",
            job_id,
            sanitize_filename(&source.stem())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, no work started yet
    #[default]
    Received,
    /// Workload is running
    Processing,
    /// Result document durably written
    Completed,
    /// Workload or persistence failed
    Failed,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Received => "received",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a job in this state may move to `next`.
    ///
    /// Self-edges are allowed for non-terminal states so that progress can be
    /// published without a status change.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Received, Received)
                | (Received, Processing)
                | (Received, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reasons an update to a job record is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Job is already {0}")]
    Frozen(JobStatus),

    #[error("Illegal status transition {from} -> {to}")]
    IllegalStatus { from: JobStatus, to: JobStatus },

    #[error("Progress may not decrease ({from} -> {to})")]
    ProgressRegressed { from: u8, to: u8 },

    #[error("Progress {0} exceeds 100")]
    ProgressOutOfRange(u8),

    #[error("Immutable field `{0}` changed")]
    ImmutableField(&'static str),

    #[error("Failed job requires an error detail")]
    MissingErrorDetail,

    #[error("Completed job must report progress 100")]
    IncompleteProgress,
}

/// One unit of submitted work tracked from submission to terminal outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Label of the in-flight phase
    pub current_step: String,

    /// Input payload reference
    pub source_ref: SourceRef,

    /// Where the result document is written
    pub result_ref: ResultRef,

    /// Failure detail (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Started at timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Reached a terminal state at
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new job in the `Received` state.
    pub fn new(id: JobId, source_ref: SourceRef, result_ref: ResultRef) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Received,
            progress: 0,
            current_step: STEP_RECEIVED.to_string(),
            source_ref,
            result_ref,
            error_detail: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    /// Start processing the job.
    pub fn start(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.updated_at = now;
    }

    /// Publish a phase boundary.
    pub fn advance(&mut self, progress: u8, step: impl Into<String>) {
        self.progress = progress.min(100);
        self.current_step = step.into();
        self.updated_at = Utc::now();
    }

    /// Mark job as completed.
    pub fn complete(&mut self) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.progress = 100;
        self.current_step = STEP_COMPLETED.to_string();
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Mark job as failed with an error detail.
    pub fn fail(&mut self, detail: impl Into<String>) {
        let now = Utc::now();
        let detail = detail.into();
        self.status = JobStatus::Failed;
        self.error_detail = Some(if detail.trim().is_empty() {
            "Job failed".to_string()
        } else {
            detail
        });
        self.updated_at = now;
        self.finished_at = Some(now);
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Validate that `next` is a legal successor of `prev`.
    pub fn check_update(prev: &Job, next: &Job) -> Result<(), TransitionError> {
        if prev.is_terminal() {
            return Err(TransitionError::Frozen(prev.status));
        }
        if next.id != prev.id {
            return Err(TransitionError::ImmutableField("id"));
        }
        if next.source_ref != prev.source_ref {
            return Err(TransitionError::ImmutableField("source_ref"));
        }
        if next.result_ref != prev.result_ref {
            return Err(TransitionError::ImmutableField("result_ref"));
        }
        if !prev.status.can_transition_to(next.status) {
            return Err(TransitionError::IllegalStatus {
                from: prev.status,
                to: next.status,
            });
        }
        if next.progress > 100 {
            return Err(TransitionError::ProgressOutOfRange(next.progress));
        }
        // A failed job keeps whatever progress it had reached; regression is
        // only meaningful while the job is live or completing.
        if next.status != JobStatus::Failed && next.progress < prev.progress {
            return Err(TransitionError::ProgressRegressed {
                from: prev.progress,
                to: next.progress,
            });
        }
        match next.status {
            JobStatus::Completed if next.progress != 100 => {
                Err(TransitionError::IncompleteProgress)
            }
            JobStatus::Failed
                if next
                    .error_detail
                    .as_deref()
                    .map_or(true, |d| d.trim().is_empty()) =>
            {
                Err(TransitionError::MissingErrorDetail)
            }
            _ => Ok(()),
        }
    }
}

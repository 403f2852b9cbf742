//! Shared data models for the video sentiment backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their status and lifecycle transitions
//! - Analysis result documents and their segments
//! - Timestamp formatting and filename helpers

pub mod analysis;
pub mod job;
pub mod timestamp;
pub mod utils;

// Re-export common types
pub use analysis::{AnalysisDocument, DocumentError, Segment};
pub use job::{
    Job, JobId, JobStatus, ResultRef, SourceRef, TransitionError, PROGRESS_SAVING, STEP_COMPLETED,
    STEP_RECEIVED, STEP_SAVING,
};
pub use timestamp::format_timestamp;
pub use utils::{sanitize_filename, DEFAULT_FILENAME};

//! Business logic services.

pub mod analysis;
pub mod retention;

pub use analysis::{AnalysisService, JobStatusView, ServiceError, ServiceResult};
pub use retention::RetentionSweeper;

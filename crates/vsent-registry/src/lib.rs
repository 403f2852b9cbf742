//! In-memory job registry.
//!
//! This crate provides:
//! - Concurrent job creation with fresh identifiers
//! - Snapshot reads that never observe a half-applied update
//! - Validated, atomic record updates for the owning executor
//! - Retention of finished jobs

pub mod error;
pub mod registry;

pub use error::{RegistryError, RegistryResult};
pub use registry::JobRegistry;

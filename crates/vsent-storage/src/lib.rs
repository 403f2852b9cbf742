//! Durable result storage.
//!
//! This crate provides:
//! - An object-store abstraction addressed by relative keys
//! - Local filesystem backend with atomic temp-file-then-rename writes
//! - In-memory backend for tests and ephemeral deployments
//! - S3-compatible backend (R2, MinIO, AWS)
//! - Result document save/load on top of any backend

pub mod error;
pub mod local;
pub mod memory;
pub mod results;
pub mod s3;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use results::ResultStore;
pub use s3::{S3Config, S3Store};
pub use store::{validate_key, ObjectStore};

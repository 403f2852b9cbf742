//! Object store abstraction.

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};

/// Key-value durable store addressed by relative, `/`-separated keys.
///
/// `put` must be all-or-nothing: a concurrent `get` observes either the
/// previous state (usually `NotFound`) or the complete new object.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// Short backend name for logs and readiness output.
    fn backend(&self) -> &'static str;

    /// Store `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()>;

    /// Read the object under `key`.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Check whether `key` holds an object.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove the object under `key`. Missing objects are not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Verify the backend is reachable.
    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Reject keys that could escape the store's namespace.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.len() > 1024 {
        return Err(StorageError::invalid_key(key));
    }
    if key.starts_with('/') || key.contains('\\') || key.contains('\0') {
        return Err(StorageError::invalid_key(key));
    }
    if key
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

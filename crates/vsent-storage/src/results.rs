//! Analysis result documents on top of an [`ObjectStore`].

use std::sync::Arc;

use tracing::{debug, info};
use vsent_models::{AnalysisDocument, ResultRef};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

const CONTENT_TYPE_JSON: &str = "application/json";

/// Saves and loads [`AnalysisDocument`]s keyed by [`ResultRef`].
#[derive(Debug, Clone)]
pub struct ResultStore {
    store: Arc<dyn ObjectStore>,
}

impl ResultStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Underlying object store.
    pub fn backend(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Persist `document` at `result_ref`.
    ///
    /// The backend write is all-or-nothing. Invalid documents are refused
    /// before anything is written.
    pub async fn save(&self, result_ref: &ResultRef, document: &AnalysisDocument) -> StorageResult<()> {
        document
            .validate()
            .map_err(|e| StorageError::corrupt(result_ref.as_str(), e))?;

        let bytes = serde_json::to_vec_pretty(document)?;
        let size = bytes.len();
        self.store
            .put(result_ref.as_str(), bytes, CONTENT_TYPE_JSON)
            .await?;

        info!(
            result_ref = %result_ref,
            backend = self.store.backend(),
            bytes = size,
            "Saved analysis result"
        );
        Ok(())
    }

    /// Read back the document at `result_ref`.
    pub async fn load(&self, result_ref: &ResultRef) -> StorageResult<AnalysisDocument> {
        let bytes = self.store.get(result_ref.as_str()).await?;
        debug!(result_ref = %result_ref, bytes = bytes.len(), "Loaded analysis result");

        let document: AnalysisDocument = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::corrupt(result_ref.as_str(), e))?;
        document
            .validate()
            .map_err(|e| StorageError::corrupt(result_ref.as_str(), e))?;
        Ok(document)
    }

    /// Whether a document exists at `result_ref`.
    pub async fn exists(&self, result_ref: &ResultRef) -> StorageResult<bool> {
        self.store.exists(result_ref.as_str()).await
    }

    /// Remove the document at `result_ref`.
    pub async fn delete(&self, result_ref: &ResultRef) -> StorageResult<()> {
        self.store.delete(result_ref.as_str()).await
    }
}

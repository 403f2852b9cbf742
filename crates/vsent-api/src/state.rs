//! Application state.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use vsent_registry::JobRegistry;
use vsent_storage::{LocalStore, ObjectStore, ResultStore, S3Store};
use vsent_worker::{mock_analysis, JobExecutor, WorkerConfig};

use crate::config::{ApiConfig, ResultBackend};
use crate::middleware::{create_rate_limiter, IpRateLimiter};
use crate::services::AnalysisService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub service: AnalysisService,
    /// Submission limiter, pruned by the retention sweeper.
    pub rate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    /// Create new application state with the result backend named in `config`.
    pub async fn new(config: ApiConfig, worker: WorkerConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn ObjectStore> = match config.result_backend {
            ResultBackend::Local => Arc::new(
                LocalStore::new(config.results_dir.clone())
                    .await
                    .with_context(|| format!("opening results dir {}", config.results_dir.display()))?,
            ),
            ResultBackend::S3 => Arc::new(S3Store::from_env().context("configuring S3 result store")?),
        };

        tokio::fs::create_dir_all(&config.upload_dir)
            .await
            .with_context(|| format!("creating upload dir {}", config.upload_dir.display()))?;

        info!(backend = store.backend(), "Result store ready");
        Ok(Self::with_store(config, worker, store))
    }

    /// Build state around an already constructed object store.
    pub fn with_store(config: ApiConfig, worker: WorkerConfig, store: Arc<dyn ObjectStore>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let results = ResultStore::new(store);
        let workload = mock_analysis(worker.phase_delays);
        let executor = JobExecutor::new(worker, Arc::clone(&registry), results.clone(), workload);
        let service = AnalysisService::new(registry, executor, results, config.max_pending_jobs);

        let rate_limiter = create_rate_limiter(config.rate_limit_rps);

        Self {
            config,
            service,
            rate_limiter,
        }
    }
}

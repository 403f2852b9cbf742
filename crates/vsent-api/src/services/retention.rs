//! Background eviction of finished jobs.
//!
//! Terminal jobs stay pollable for the retention period and are then
//! dropped from the registry. Jobs still running are never touched, and
//! result documents stay in the store. The same tick prunes idle clients
//! from the submission rate limiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics;
use crate::middleware::{prune_rate_limiter, IpRateLimiter};
use crate::services::AnalysisService;

/// Periodic retention sweep over the job registry.
pub struct RetentionSweeper {
    service: AnalysisService,
    retention: Duration,
    sweep_interval: Duration,
    rate_limiter: Option<Arc<IpRateLimiter>>,
    shutdown: CancellationToken,
}

impl RetentionSweeper {
    pub fn new(service: AnalysisService, retention: Duration, sweep_interval: Duration) -> Self {
        Self {
            service,
            retention,
            sweep_interval,
            rate_limiter: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Also prune idle per-IP state from `limiter` on every sweep.
    pub fn with_rate_limiter(mut self, limiter: Arc<IpRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(&self) {
        info!(
            "Starting retention sweeper (retention: {:?}, interval: {:?})",
            self.retention, self.sweep_interval
        );

        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Retention sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    self.sweep();
                }
            }
        }
    }

    /// Run a single sweep and return the number of evicted jobs.
    pub fn sweep(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let evicted = self.service.evict_finished(ttl);

        let (tracked, active) = self.service.job_counts();
        metrics::set_tracked_jobs(tracked, active);

        if let Some(limiter) = &self.rate_limiter {
            prune_rate_limiter(limiter);
        }

        if evicted > 0 {
            info!(evicted, tracked, "Evicted finished jobs");
        } else {
            debug!(tracked, active, "Retention sweep found nothing to evict");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Instant;

    use vsent_models::SourceRef;
    use vsent_registry::JobRegistry;
    use vsent_storage::{MemoryStore, ResultStore};
    use vsent_worker::{mock_analysis, JobExecutor, PhaseDelays, WorkerConfig};

    use super::*;

    fn service() -> AnalysisService {
        let registry = Arc::new(JobRegistry::new());
        let results = ResultStore::new(Arc::new(MemoryStore::new()));
        let executor = JobExecutor::new(
            WorkerConfig::for_tests(),
            Arc::clone(&registry),
            results.clone(),
            mock_analysis(PhaseDelays::none()),
        );
        AnalysisService::new(registry, executor, results, 0)
    }

    async fn finish(service: &AnalysisService, source: &str) -> vsent_models::JobId {
        let id = service.submit(SourceRef::new(source)).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !service.poll(&id).unwrap().status.is_terminal() {
            assert!(Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        id
    }

    #[tokio::test]
    async fn test_sweep_respects_retention() {
        let service = service();
        let id = finish(&service, "clip1").await;

        let keep = RetentionSweeper::new(service.clone(), Duration::from_secs(3600), Duration::from_secs(1));
        assert_eq!(keep.sweep(), 0);
        assert!(service.poll(&id).is_ok());

        let drop_all = RetentionSweeper::new(service.clone(), Duration::ZERO, Duration::from_secs(1));
        assert_eq!(drop_all.sweep(), 1);
        assert!(service.poll(&id).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_sweep_prunes_rate_limiter() {
        let limiter = crate::middleware::create_rate_limiter(20);
        for n in 0..500u32 {
            let ip = IpAddr::from(Ipv4Addr::from(0xc633_6400 + n));
            assert!(limiter.check_key(&ip).is_ok());
        }
        assert_eq!(limiter.len(), 500);

        let sweeper = RetentionSweeper::new(service(), Duration::from_secs(3600), Duration::from_secs(1))
            .with_rate_limiter(Arc::clone(&limiter));
        tokio::time::sleep(Duration::from_millis(200)).await;
        sweeper.sweep();

        assert_eq!(limiter.len(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let sweeper = RetentionSweeper::new(service(), Duration::ZERO, Duration::from_millis(10));
        let token = sweeper.shutdown_token();

        let handle = tokio::spawn(async move { sweeper.run().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

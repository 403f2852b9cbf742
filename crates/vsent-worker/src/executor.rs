//! Job executor.
//!
//! Every launched job gets one task on a [`TaskTracker`]. The task waits for
//! a concurrency permit (the job stays `Received` meanwhile), runs the
//! workload steps on a nested task so panics surface as a `JoinError`, saves
//! the result document and only then marks the job `Completed`. Every
//! failure path ends in `Failed` with a detail message.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn, Instrument};

use vsent_models::{JobId, PROGRESS_SAVING, STEP_SAVING};
use vsent_registry::JobRegistry;
use vsent_storage::ResultStore;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::workload::{Workload, WorkloadContext};

const OPERATION: &str = "video_analysis";

/// Metric names.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "vsent_jobs_started_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vsent_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vsent_jobs_failed_total";
    pub const JOB_DURATION_SECONDS: &str = "vsent_job_duration_seconds";
    pub const JOBS_RUNNING: &str = "vsent_jobs_running";
}

/// Runs jobs in the background and drives them through their lifecycle.
#[derive(Clone)]
pub struct JobExecutor {
    config: WorkerConfig,
    registry: Arc<JobRegistry>,
    results: ResultStore,
    workload: Arc<Workload>,
    job_semaphore: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    tokens: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("config", &self.config)
            .field("workload", &self.workload)
            .field("active_jobs", &self.active_jobs())
            .finish()
    }
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        registry: Arc<JobRegistry>,
        results: ResultStore,
        workload: Workload,
    ) -> Self {
        let permits = config.max_concurrent_jobs.max(1);
        info!(
            max_concurrent_jobs = permits,
            steps = workload.len(),
            "Starting job executor"
        );

        Self {
            job_semaphore: Arc::new(Semaphore::new(permits)),
            config,
            registry,
            results,
            workload: Arc::new(workload),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start running `job_id` in the background and return immediately.
    pub fn launch(&self, job_id: &JobId) -> WorkerResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(WorkerError::ShuttingDown);
        }

        let token = self.shutdown.child_token();
        {
            let mut tokens = self.tokens();
            if tokens.contains_key(job_id) {
                return Err(WorkerError::AlreadyRunning(job_id.clone()));
            }
            tokens.insert(job_id.clone(), token.clone());
        }

        let logger = JobLogger::new(job_id, OPERATION);
        let span = logger.span();
        let this = self.clone();
        let job_id = job_id.clone();
        self.tracker
            .spawn(async move { this.execute_job(job_id, token, logger).await }.instrument(span));
        Ok(())
    }

    /// Signal cancellation to a launched job.
    ///
    /// Returns `false` when the job is not owned by this executor (unknown
    /// or already finished).
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.tokens().get(job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel all jobs and wait for their tasks to wind down.
    ///
    /// Returns `false` if tasks were still running when `shutdown_timeout`
    /// elapsed.
    pub async fn shutdown(&self) -> bool {
        info!(active_jobs = self.active_jobs(), "Shutting down job executor");
        self.shutdown.cancel();
        self.tracker.close();

        match tokio::time::timeout(self.config.shutdown_timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Job executor stopped");
                true
            }
            Err(_) => {
                warn!(
                    remaining = self.tracker.len(),
                    "Timed out waiting for in-flight jobs"
                );
                false
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Jobs launched and not yet finished (waiting or running).
    pub fn active_jobs(&self) -> usize {
        self.tokens().len()
    }

    /// Jobs currently holding a concurrency permit.
    pub fn running_jobs(&self) -> usize {
        self.config
            .max_concurrent_jobs
            .max(1)
            .saturating_sub(self.job_semaphore.available_permits())
    }

    fn stop_reason(&self) -> WorkerError {
        if self.shutdown.is_cancelled() {
            WorkerError::ShuttingDown
        } else {
            WorkerError::Cancelled
        }
    }

    async fn execute_job(self, job_id: JobId, token: CancellationToken, logger: JobLogger) {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.job_semaphore).acquire_owned() => permit.ok(),
        };

        let Some(permit) = permit else {
            self.finish(&job_id, Err(self.stop_reason()), &logger);
            return;
        };

        counter!(names::JOBS_STARTED_TOTAL).increment(1);
        gauge!(names::JOBS_RUNNING).increment(1.0);
        let started = Instant::now();

        let outcome = self.run_job(&job_id, &token, &logger).await;

        gauge!(names::JOBS_RUNNING).decrement(1.0);
        let elapsed = started.elapsed().as_secs_f64();
        histogram!(names::JOB_DURATION_SECONDS).record(elapsed);
        if outcome.is_ok() {
            logger.log_completion(elapsed);
        }

        self.finish(&job_id, outcome, &logger);
        drop(permit);
    }

    async fn run_job(
        &self,
        job_id: &JobId,
        token: &CancellationToken,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        if token.is_cancelled() {
            return Err(self.stop_reason());
        }

        let job = self.registry.update(job_id, |job| job.start())?;
        logger.log_start(job.source_ref.as_str());

        let ctx = WorkloadContext::new(&job, token.clone());
        let workload = Arc::clone(&self.workload);
        let registry = Arc::clone(&self.registry);
        let step_logger = logger.clone();
        // Steps run on their own task so a panic surfaces as a JoinError.
        let handle = tokio::spawn(
            async move { workload.run(&registry, ctx, &step_logger).await }
                .instrument(logger.span()),
        );
        let abort = handle.abort_handle();

        let joined = tokio::select! {
            _ = token.cancelled() => {
                abort.abort();
                return Err(self.stop_reason());
            }
            joined = tokio::time::timeout(self.config.job_timeout, handle) => joined,
        };

        let document = match joined {
            Err(_) => {
                abort.abort();
                return Err(WorkerError::TimedOut(self.config.job_timeout));
            }
            Ok(Err(e)) if e.is_panic() => {
                return Err(WorkerError::Panicked(panic_message(e.into_panic())));
            }
            Ok(Err(_)) => return Err(self.stop_reason()),
            Ok(Ok(result)) => result?,
        };

        if token.is_cancelled() {
            return Err(self.stop_reason());
        }
        document.validate()?;

        self.registry
            .update(job_id, |job| job.advance(PROGRESS_SAVING, STEP_SAVING))?;
        logger.log_progress(PROGRESS_SAVING, STEP_SAVING);

        self.results.save(&job.result_ref, &document).await?;
        self.registry.update(job_id, |job| job.complete())?;
        Ok(())
    }

    fn finish(&self, job_id: &JobId, outcome: WorkerResult<()>, logger: &JobLogger) {
        match outcome {
            Ok(()) => {
                counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
            }
            Err(e) => {
                counter!(names::JOBS_FAILED_TOTAL, "reason" => e.kind()).increment(1);
                let detail = e.to_string();
                logger.log_error(&detail);
                if let Err(update) = self.registry.update(job_id, |job| job.fail(detail)) {
                    logger.log_warning(&format!("Could not record failure: {}", update));
                }
            }
        }
        // Released only after the terminal state is visible.
        self.tokens().remove(job_id);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio_test::{assert_err, assert_ok};
    use vsent_models::{Job, JobStatus, ResultRef, SourceRef, STEP_COMPLETED};
    use vsent_storage::{MemoryStore, ObjectStore, StorageError, StorageResult};

    use super::*;
    use crate::error::WorkloadError;
    use crate::workload::{mock_analysis, WorkloadStep};
    use crate::PhaseDelays;

    struct Fixture {
        registry: Arc<JobRegistry>,
        store: MemoryStore,
        executor: JobExecutor,
    }

    impl Fixture {
        fn new(config: WorkerConfig, workload: Workload) -> Self {
            let store = MemoryStore::new();
            Self::build(config, workload, Arc::new(store.clone()), store)
        }

        fn with_store(config: WorkerConfig, workload: Workload, store: Arc<dyn ObjectStore>) -> Self {
            Self::build(config, workload, store, MemoryStore::new())
        }

        fn build(
            config: WorkerConfig,
            workload: Workload,
            backend: Arc<dyn ObjectStore>,
            store: MemoryStore,
        ) -> Self {
            let registry = Arc::new(JobRegistry::new());
            let executor = JobExecutor::new(
                config,
                Arc::clone(&registry),
                ResultStore::new(backend),
                workload,
            );
            Self {
                registry,
                store,
                executor,
            }
        }

        fn submit(&self, source: &str) -> JobId {
            let source = SourceRef::new(source);
            let id = self
                .registry
                .create_with(source.clone(), |id| ResultRef::for_job(id, &source));
            self.executor.launch(&id).unwrap();
            id
        }

        async fn wait_for<F>(&self, id: &JobId, done: F) -> Job
        where
            F: Fn(&Job) -> bool,
        {
            let deadline = Instant::now() + Duration::from_secs(5);
            loop {
                let job = self.registry.get(id).unwrap();
                if done(&job) {
                    return job;
                }
                assert!(Instant::now() < deadline, "timed out waiting, job: {job:?}");
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }

        async fn wait_terminal(&self, id: &JobId) -> Job {
            self.wait_for(id, |j| j.is_terminal()).await
        }
    }

    struct Fail;

    #[async_trait]
    impl WorkloadStep for Fail {
        fn label(&self) -> &str {
            "Transcribing audio"
        }
        fn progress(&self) -> u8 {
            30
        }
        async fn execute(&self, _ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
            Err(WorkloadError::failed("decoder crashed"))
        }
    }

    struct Panic;

    #[async_trait]
    impl WorkloadStep for Panic {
        fn label(&self) -> &str {
            "Analyzing sentiment"
        }
        fn progress(&self) -> u8 {
            60
        }
        async fn execute(&self, _ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
            panic!("model exploded");
        }
    }

    /// Blocks until `release` is cancelled.
    struct Gate {
        release: CancellationToken,
    }

    #[async_trait]
    impl WorkloadStep for Gate {
        fn label(&self) -> &str {
            "Waiting"
        }
        fn progress(&self) -> u8 {
            80
        }
        async fn execute(&self, _ctx: &mut WorkloadContext) -> Result<(), WorkloadError> {
            self.release.cancelled().await;
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl ObjectStore for BrokenStore {
        fn backend(&self) -> &'static str {
            "broken"
        }
        async fn put(&self, _key: &str, _data: Vec<u8>, _ct: &str) -> StorageResult<()> {
            Err(StorageError::upload_failed("disk full"))
        }
        async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::not_found(key))
        }
        async fn exists(&self, _key: &str) -> StorageResult<bool> {
            Ok(false)
        }
        async fn delete(&self, _key: &str) -> StorageResult<()> {
            Ok(())
        }
        async fn check_connectivity(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn gated(release: &CancellationToken) -> Workload {
        mock_analysis(PhaseDelays::none()).step(Gate {
            release: release.clone(),
        })
    }

    #[tokio::test]
    async fn test_job_completes_after_result_is_saved() {
        let fx = Fixture::new(WorkerConfig::for_tests(), mock_analysis(PhaseDelays::none()));
        let id = fx.submit("clip1");

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.current_step, STEP_COMPLETED);
        assert!(job.error_detail.is_none());
        assert!(job.finished_at.is_some());

        let results = ResultStore::new(Arc::new(fx.store.clone()));
        let doc = results.load(&job.result_ref).await.unwrap();
        assert_eq!(doc.filename, "clip1");
        assert_eq!(doc.segments.len(), 10);
        assert!(doc.duration > 0.0);
    }

    #[tokio::test]
    async fn test_step_error_fails_job() {
        let fx = Fixture::new(WorkerConfig::for_tests(), Workload::new().step(Fail));
        let id = fx.submit("clip1");

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_detail.as_deref(),
            Some("Transcribing audio failed: decoder crashed")
        );
        assert!(fx.store.is_empty().await);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let fx = Fixture::new(WorkerConfig::for_tests(), Workload::new().step(Panic));
        let id = fx.submit("clip1");

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_detail.as_deref(),
            Some("Workload panicked: model exploded")
        );

        // The executor keeps accepting work.
        let again = fx.submit("clip2");
        assert_eq!(fx.wait_terminal(&again).await.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_timeout_fails_job() {
        let release = CancellationToken::new();
        let config = WorkerConfig {
            job_timeout: Duration::from_millis(50),
            ..WorkerConfig::for_tests()
        };
        let fx = Fixture::new(config, gated(&release));
        let id = fx.submit("clip1");

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_detail.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_store_failure_fails_job() {
        let fx = Fixture::with_store(
            WorkerConfig::for_tests(),
            mock_analysis(PhaseDelays::none()),
            Arc::new(BrokenStore),
        );
        let id = fx.submit("clip1");

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_detail.unwrap().starts_with("Failed to save results"));
        assert_eq!(job.progress, PROGRESS_SAVING);
    }

    #[tokio::test]
    async fn test_cancel_running_job() {
        let release = CancellationToken::new();
        let fx = Fixture::new(WorkerConfig::for_tests(), gated(&release));
        let id = fx.submit("clip1");

        fx.wait_for(&id, |j| j.current_step == "Waiting").await;
        assert!(fx.executor.cancel(&id));

        let job = fx.wait_terminal(&id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_detail.unwrap().contains("cancelled"));
        assert!(!fx.executor.cancel(&id));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let fx = Fixture::new(WorkerConfig::for_tests(), Workload::new());
        assert!(!fx.executor.cancel(&JobId::new()));
    }

    #[tokio::test]
    async fn test_concurrency_cap_keeps_waiting_jobs_received() {
        let release = CancellationToken::new();
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            ..WorkerConfig::for_tests()
        };
        let fx = Fixture::new(config, gated(&release));

        let first = fx.submit("clip1");
        let second = fx.submit("clip2");
        fx.wait_for(&first, |j| j.current_step == "Waiting").await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = fx.registry.get(&second).unwrap();
        assert_eq!(waiting.status, JobStatus::Received);
        assert_eq!(waiting.progress, 0);
        assert_eq!(fx.executor.running_jobs(), 1);
        assert_eq!(fx.executor.active_jobs(), 2);

        release.cancel();
        assert_eq!(fx.wait_terminal(&first).await.status, JobStatus::Completed);
        assert_eq!(fx.wait_terminal(&second).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_permit() {
        let release = CancellationToken::new();
        let config = WorkerConfig {
            max_concurrent_jobs: 1,
            ..WorkerConfig::for_tests()
        };
        let fx = Fixture::new(config, gated(&release));

        let first = fx.submit("clip1");
        let second = fx.submit("clip2");
        fx.wait_for(&first, |j| j.current_step == "Waiting").await;

        assert!(fx.executor.cancel(&second));
        let job = fx.wait_terminal(&second).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.started_at.is_none());

        release.cancel();
        assert_eq!(fx.wait_terminal(&first).await.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let fx = Fixture::new(
            WorkerConfig::for_tests(),
            mock_analysis(PhaseDelays::uniform(Duration::from_millis(20))),
        );
        let id = fx.submit("clip1");

        let mut seen = Vec::new();
        loop {
            let job = fx.registry.get(&id).unwrap();
            seen.push(job.progress);
            if job.is_terminal() {
                assert_eq!(job.status, JobStatus::Completed);
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_launch_twice_is_rejected() {
        let release = CancellationToken::new();
        let fx = Fixture::new(WorkerConfig::for_tests(), gated(&release));
        let id = fx.submit("clip1");

        assert_err!(fx.executor.launch(&id));
        release.cancel();
        fx.wait_terminal(&id).await;
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_jobs() {
        let release = CancellationToken::new();
        let fx = Fixture::new(WorkerConfig::for_tests(), gated(&release));
        let id = fx.submit("clip1");
        fx.wait_for(&id, |j| j.current_step == "Waiting").await;

        assert!(fx.executor.shutdown().await);
        assert!(fx.executor.is_shutting_down());

        let job = fx.registry.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_detail.as_deref(), Some("Executor is shutting down"));

        let late = fx
            .registry
            .create(SourceRef::new("clip2"), ResultRef::new("late/r-clip2.json"));
        assert!(matches!(
            fx.executor.launch(&late),
            Err(WorkerError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn test_finished_jobs_release_their_token() {
        let fx = Fixture::new(WorkerConfig::for_tests(), mock_analysis(PhaseDelays::none()));
        let id = fx.submit("clip1");
        fx.wait_terminal(&id).await;

        let deadline = Instant::now() + Duration::from_secs(5);
        while fx.executor.active_jobs() > 0 {
            assert!(Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_ok!(fx.registry.get(&id));
    }
}

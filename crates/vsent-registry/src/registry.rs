//! Job registry backed by a single mapping-wide lock.
//!
//! Readers (pollers) take the read lock and clone a snapshot; the owning
//! executor mutates a copy under the write lock and swaps it in only after
//! [`Job::check_update`] accepts it, so a reader sees either the previous
//! record or the next one, never a mix.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use vsent_models::{Job, JobId, ResultRef, SourceRef};

use crate::error::{RegistryError, RegistryResult};

/// Concurrency-safe store of all job records, queried by identifier.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Mutators run on a clone, so a poisoned lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new `Received` job and return its identifier.
    pub fn create(&self, source_ref: SourceRef, result_ref: ResultRef) -> JobId {
        self.create_with(source_ref, |_| result_ref)
    }

    /// Insert a new job whose result location is derived from its fresh id.
    pub fn create_with<F>(&self, source_ref: SourceRef, result_ref: F) -> JobId
    where
        F: FnOnce(&JobId) -> ResultRef,
    {
        let mut jobs = self.write();

        // UUID v4 collisions are not expected; the loop keeps ids unique anyway.
        let mut id = JobId::new();
        while jobs.contains_key(&id) {
            id = JobId::new();
        }

        let result_ref = result_ref(&id);
        debug!(
            job_id = %id,
            source_ref = %source_ref,
            result_ref = %result_ref,
            "Registered job"
        );
        jobs.insert(id.clone(), Job::new(id.clone(), source_ref, result_ref));
        id
    }

    /// Snapshot of a job's current fields.
    pub fn get(&self, id: &JobId) -> RegistryResult<Job> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::not_found(id))
    }

    /// Atomically apply `mutate` to a job and return the committed snapshot.
    ///
    /// The record is left untouched when the id is unknown or when the
    /// mutation would break a lifecycle invariant (terminal jobs are frozen,
    /// progress never decreases, references are immutable).
    pub fn update<F>(&self, id: &JobId, mutate: F) -> RegistryResult<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut jobs = self.write();
        let current = jobs.get_mut(id).ok_or_else(|| RegistryError::not_found(id))?;

        let mut next = current.clone();
        mutate(&mut next);

        if let Err(source) = Job::check_update(current, &next) {
            warn!(job_id = %id, error = %source, "Rejected job update");
            return Err(RegistryError::InvalidTransition {
                job_id: id.clone(),
                source,
            });
        }

        *current = next;
        Ok(current.clone())
    }

    /// Snapshots of all jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Number of known jobs.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Number of jobs not yet in a terminal state.
    pub fn active_count(&self) -> usize {
        self.read().values().filter(|j| !j.is_terminal()).count()
    }

    /// Drop terminal jobs that finished more than `older_than` ago.
    ///
    /// Jobs still running are never evicted. Returns the number removed.
    pub fn evict_finished(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.write();
        let before = jobs.len();

        jobs.retain(|_, job| {
            !(job.is_terminal() && job.finished_at.is_some_and(|at| at <= cutoff))
        });

        let evicted = before - jobs.len();
        if evicted > 0 {
            debug!(evicted, remaining = jobs.len(), "Evicted finished jobs");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use vsent_models::{JobStatus, TransitionError};

    use super::*;

    fn create(registry: &JobRegistry, source: &str) -> JobId {
        registry.create_with(SourceRef::new(source), |id| {
            ResultRef::for_job(id, &SourceRef::new(source))
        })
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let id = create(&registry, "clip1");

        let job = registry.get(&id).unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Received);
        assert_eq!(job.progress, 0);
        assert_eq!(job.result_ref.as_str(), format!("{}/r-clip1.json", id));
    }

    #[test]
    fn test_get_unknown() {
        let registry = JobRegistry::new();
        let missing = JobId::from_string("nope");
        assert_eq!(
            registry.get(&missing),
            Err(RegistryError::NotFound(missing.clone()))
        );
    }

    #[test]
    fn test_update_unknown_is_noop() {
        let registry = JobRegistry::new();
        let result = registry.update(&JobId::from_string("nope"), |job| job.start());
        assert!(result.unwrap_err().is_not_found());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_update_applies_atomically() {
        let registry = JobRegistry::new();
        let id = create(&registry, "clip1");

        let job = registry
            .update(&id, |job| {
                job.start();
                job.advance(30, "Transcribing audio");
            })
            .unwrap();

        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(registry.get(&id).unwrap(), job);
    }

    #[test]
    fn test_rejected_update_leaves_record_untouched() {
        let registry = JobRegistry::new();
        let id = create(&registry, "clip1");
        registry
            .update(&id, |job| {
                job.start();
                job.advance(60, "Analyzing sentiment");
            })
            .unwrap();
        let before = registry.get(&id).unwrap();

        let err = registry
            .update(&id, |job| job.advance(10, "Extracting audio"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::InvalidTransition {
                job_id: id.clone(),
                source: TransitionError::ProgressRegressed { from: 60, to: 10 },
            }
        );
        assert_eq!(registry.get(&id).unwrap(), before);
    }

    #[test]
    fn test_terminal_jobs_are_frozen() {
        let registry = JobRegistry::new();
        let id = create(&registry, "clip1");
        registry.update(&id, |job| job.start()).unwrap();
        let done = registry.update(&id, |job| job.complete()).unwrap();

        assert!(registry.update(&id, |job| job.fail("late")).is_err());
        assert_eq!(registry.get(&id).unwrap(), done);
    }

    #[test]
    fn test_jobs_are_isolated() {
        let registry = JobRegistry::new();
        let a = create(&registry, "a");
        let b = create(&registry, "b");
        let b_before = registry.get(&b).unwrap();

        registry
            .update(&a, |job| {
                job.start();
                job.advance(60, "Analyzing sentiment");
            })
            .unwrap();

        assert_eq!(registry.get(&b).unwrap(), b_before);
    }

    #[test]
    fn test_concurrent_creates_yield_unique_ids() {
        let registry = Arc::new(JobRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|i| create(&registry, &format!("clip-{}-{}", t, i)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.len(), 400);
        assert_eq!(registry.active_count(), 400);
    }

    #[test]
    fn test_readers_never_see_torn_updates() {
        let registry = Arc::new(JobRegistry::new());
        let id = create(&registry, "clip1");
        registry.update(&id, |job| job.start()).unwrap();

        let writer = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            std::thread::spawn(move || {
                for p in 1..=99u8 {
                    registry
                        .update(&id, |job| job.advance(p, format!("step-{}", p)))
                        .unwrap();
                }
            })
        };

        let mut last = 0u8;
        for _ in 0..1000 {
            let job = registry.get(&id).unwrap();
            assert!(job.progress >= last);
            if job.progress > 0 {
                assert_eq!(job.current_step, format!("step-{}", job.progress));
            }
            last = job.progress;
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_evict_only_finished_jobs() {
        let registry = JobRegistry::new();
        let running = create(&registry, "running");
        let done = create(&registry, "done");
        let failed = create(&registry, "failed");

        registry.update(&running, |job| job.start()).unwrap();
        registry.update(&done, |job| job.start()).unwrap();
        registry.update(&done, |job| job.complete()).unwrap();
        registry.update(&failed, |job| job.fail("boom")).unwrap();

        // Nothing finished long enough ago.
        assert_eq!(registry.evict_finished(Duration::hours(1)), 0);
        assert_eq!(registry.len(), 3);

        assert_eq!(registry.evict_finished(Duration::zero()), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.get(&running).is_ok());
        assert!(registry.get(&done).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_shared_across_tasks() {
        let registry = Arc::new(JobRegistry::new());
        let id = create(&registry, "clip1");

        let task = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move {
                registry.update(&id, |job| job.start()).map(|j| j.status)
            })
        };

        assert_eq!(task.await.unwrap(), Ok(JobStatus::Processing));
    }
}

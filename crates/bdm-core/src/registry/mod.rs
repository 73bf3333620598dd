//! In-memory job registry with per-job locking.
//!
//! The map of records sits behind an `RwLock`; each record has its own
//! `Mutex`. Mutators take the map lock only long enough to clone the record's
//! `Arc`, so work on unrelated jobs never contends. Nothing here touches disk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::job::{Job, JobId, JobStatus};

/// Returned by `create` when the id is already present.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job {0} already exists")]
    Duplicate(JobId),
}

struct Entry {
    /// Insertion order, used to keep snapshots in submission order.
    seq: u64,
    job: Mutex<Job>,
}

impl Entry {
    fn lock(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Entry>>>,
    next_seq: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, job: Job) -> Result<JobId, RegistryError> {
        let id = job.id;
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        if jobs.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        jobs.insert(
            id,
            Arc::new(Entry {
                seq,
                job: Mutex::new(job),
            }),
        );
        Ok(id)
    }

    fn entry(&self, id: JobId) -> Option<Arc<Entry>> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    /// Snapshot of one job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.entry(id).map(|e| e.lock().clone())
    }

    /// Snapshot of every job, in submission order. Each record is copied under
    /// its own lock, so no snapshot shows a half-applied update.
    pub fn get_all(&self) -> Vec<Job> {
        let mut entries: Vec<Arc<Entry>> = self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.seq);
        entries.iter().map(|e| e.lock().clone()).collect()
    }

    /// Runs `f` on the job under its lock. Returns None if the job is gone.
    pub fn update<R>(&self, id: JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let entry = self.entry(id)?;
        let mut job = entry.lock();
        Some(f(&mut job))
    }

    /// Removes terminal jobs for which `predicate` holds; returns how many went.
    /// Jobs that are queued or downloading are never removed.
    pub fn remove_if(&self, mut predicate: impl FnMut(&Job) -> bool) -> usize {
        let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let job = entry.lock();
            !(job.is_terminal() && predicate(&job))
        });
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_by_status(&self, status: JobStatus) -> usize {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|e| e.lock().status == status)
            .count()
    }

    /// Jobs per status in one pass under a single map lock. Every status is
    /// present, with 0 where no job has it.
    pub fn counts(&self) -> HashMap<JobStatus, usize> {
        let mut counts: HashMap<JobStatus, usize> =
            JobStatus::ALL.iter().map(|s| (*s, 0)).collect();
        let jobs = self.jobs.read().unwrap_or_else(PoisonError::into_inner);
        for entry in jobs.values() {
            *counts.entry(entry.lock().status).or_default() += 1;
        }
        counts
    }
}

//! Batch façade: the operations front ends use to submit, track and stop downloads.
//!
//! `BatchManager::start` spawns the scheduler on the current Tokio runtime.
//! Submitted work never reports failure through these calls; a job that cannot
//! be downloaded ends up `failed` with its `error` set.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::control::JobControl;
use crate::downloader::Backends;
use crate::job::{Job, JobId, JobOptions, JobStatus};
use crate::proxy::ProxySource;
use crate::queue::{job_queue, JobQueue, QueueError};
use crate::registry::JobRegistry;
use crate::scheduler::{Scheduler, WorkerContext};
use crate::source::{SourceError, UrlListSource};

/// Engine limits and timeouts.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSettings {
    /// Maximum simultaneous downloads (at least 1).
    pub max_concurrent: usize,
    /// Cap on jobs waiting for a worker; None means unbounded.
    pub max_queue_depth: Option<usize>,
    /// Soft limit on a single download; None means no limit.
    pub worker_timeout: Option<Duration>,
    /// How long `stop` waits for in-flight downloads.
    pub stop_timeout: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            max_queue_depth: None,
            worker_timeout: None,
            stop_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("cannot accept job: {0}")]
    QueueFull(QueueError),
    #[error("batch manager is stopped")]
    Stopped,
    #[error(transparent)]
    Source(#[from] SourceError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} is already {1}")]
    AlreadyTerminal(JobId, JobStatus),
}

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub queued: usize,
    pub downloading: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchStats {
    pub fn total(&self) -> usize {
        self.queued + self.downloading + self.completed + self.failed + self.cancelled
    }

    /// Queued plus downloading.
    pub fn outstanding(&self) -> usize {
        self.queued + self.downloading
    }
}

pub struct BatchManager {
    registry: Arc<JobRegistry>,
    control: Arc<JobControl>,
    backends: Backends,
    queue: JobQueue,
    scheduler: Scheduler,
    settings: BatchSettings,
}

impl BatchManager {
    /// Starts the engine. Must be called from within a Tokio runtime.
    pub fn start(
        settings: BatchSettings,
        backends: Backends,
        proxy_source: Option<Arc<dyn ProxySource>>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let registry = Arc::new(JobRegistry::new());
        let control = Arc::new(JobControl::new(shutdown.clone()));
        let (queue, receiver) = job_queue(settings.max_queue_depth);
        let ctx = Arc::new(WorkerContext {
            registry: Arc::clone(&registry),
            control: Arc::clone(&control),
            backends: backends.clone(),
            proxy_source,
            worker_timeout: settings.worker_timeout,
        });
        let scheduler = Scheduler::spawn(ctx, receiver, settings.max_concurrent, shutdown);
        tracing::info!(
            max_concurrent = settings.max_concurrent.max(1),
            "batch manager started"
        );
        Self {
            registry,
            control,
            backends,
            queue,
            scheduler,
            settings,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Queues one URL. The URL is not checked beyond being non-blank; a bad
    /// one surfaces later as a failed job.
    pub fn submit_one(&self, url: &str, options: JobOptions) -> Result<JobId, BatchError> {
        if !self.scheduler.is_running() {
            return Err(BatchError::Stopped);
        }
        let url = url.trim();
        if url.is_empty() {
            return Err(BatchError::Validation("URL is empty".to_string()));
        }
        if options.proxy.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(BatchError::Validation("proxy is empty".to_string()));
        }

        let backend = self.backends.resolve(options.backend, url);
        let job = Job::new(url, backend, options);
        let id = self
            .registry
            .create(job)
            .map_err(|e| BatchError::Validation(e.to_string()))?;
        if let Err(e) = self.queue.push(id) {
            // Never admitted: drop the record rather than leave a job no worker will see.
            self.registry.update(id, |j| j.cancel());
            self.registry.remove_if(|j| j.id == id);
            return Err(match e {
                QueueError::Closed => BatchError::Stopped,
                full @ QueueError::Full { .. } => BatchError::QueueFull(full),
            });
        }
        tracing::info!("job {} queued ({} backend): {}", id, backend, url);
        Ok(id)
    }

    /// Queues each URL independently; earlier successes are kept if a later one fails.
    pub fn submit_many<S: AsRef<str>>(
        &self,
        urls: &[S],
        options: JobOptions,
    ) -> Vec<Result<JobId, BatchError>> {
        urls.iter()
            .map(|u| self.submit_one(u.as_ref(), options.clone()))
            .collect()
    }

    /// Reads URLs from `source` and queues them in order.
    pub fn submit_from_source(
        &self,
        source: &dyn UrlListSource,
        path: &Path,
        options: JobOptions,
    ) -> Result<Vec<Result<JobId, BatchError>>, BatchError> {
        let urls = source.read_urls(path)?;
        Ok(self.submit_many(&urls, options))
    }

    /// Cancels a queued or downloading job. An in-flight transfer is asked
    /// to stop; the job is recorded as cancelled either way.
    pub fn try_cancel(&self, id: JobId) -> Result<(), CancelError> {
        let previous = self
            .registry
            .update(id, |job| {
                let previous = job.status;
                job.cancel().then_some(previous).ok_or(previous)
            })
            .ok_or(CancelError::NotFound(id))?
            .map_err(|status| CancelError::AlreadyTerminal(id, status))?;

        if previous == JobStatus::Downloading && !self.control.request_abort(id) {
            tracing::debug!("job {} had no active transfer to interrupt", id);
        }
        tracing::info!("job {} cancelled (was {})", id, previous);
        Ok(())
    }

    /// True iff the job existed and was not already terminal.
    pub fn cancel(&self, id: JobId) -> bool {
        self.try_cancel(id).is_ok()
    }

    pub fn query(&self, id: JobId) -> Option<Job> {
        self.registry.get(id)
    }

    /// All jobs in submission order.
    pub fn query_all(&self) -> Vec<Job> {
        self.registry.get_all()
    }

    /// Removes completed, failed and cancelled jobs; returns how many.
    pub fn clear_completed(&self) -> usize {
        let removed = self.registry.remove_if(|_| true);
        if removed > 0 {
            tracing::debug!("cleared {} finished job(s)", removed);
        }
        removed
    }

    pub fn stats(&self) -> BatchStats {
        let counts = self.registry.counts();
        let count = |status| counts.get(&status).copied().unwrap_or(0);
        BatchStats {
            queued: count(JobStatus::Queued),
            downloading: count(JobStatus::Downloading),
            completed: count(JobStatus::Completed),
            failed: count(JobStatus::Failed),
            cancelled: count(JobStatus::Cancelled),
        }
    }

    /// No job is queued or downloading.
    pub fn is_idle(&self) -> bool {
        self.stats().outstanding() == 0
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Cancels every outstanding job, stops admitting work and waits (bounded
    /// by `stop_timeout`) for in-flight downloads. Safe to call more than once.
    pub async fn stop(&self) {
        self.scheduler.signal_shutdown();
        let mut cancelled = self.cancel_outstanding();
        let drained = self.scheduler.stop(self.settings.stop_timeout).await;
        // A submit racing with shutdown may have slipped a job in after the first sweep.
        cancelled += self.cancel_outstanding();
        tracing::info!(cancelled, drained, "batch manager stopped");
    }

    fn cancel_outstanding(&self) -> usize {
        self.registry
            .get_all()
            .into_iter()
            .filter(|j| !j.is_terminal())
            .filter(|j| self.try_cancel(j.id).is_ok())
            .count()
    }
}

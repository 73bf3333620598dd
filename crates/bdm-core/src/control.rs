//! Cancellation tokens for in-flight jobs.
//!
//! Every job a worker picks up is registered with a token derived from the
//! engine's shutdown token. Cancelling a job (or stopping the engine) trips
//! the token; backends that poll it stop their transfer, the rest ignore it.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tokio_util::sync::CancellationToken;

use crate::job::JobId;

/// Shared map of job id -> cancellation token for jobs currently being processed.
pub struct JobControl {
    shutdown: CancellationToken,
    jobs: RwLock<HashMap<JobId, CancellationToken>>,
}

impl JobControl {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Register a job about to start; returns the token to hand to the backend.
    /// The token is already cancelled if the engine is shutting down.
    pub fn register(&self, job_id: JobId) -> CancellationToken {
        let token = self.shutdown.child_token();
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_id, token.clone());
        token
    }

    /// Unregister a job once its worker is done with it.
    pub fn unregister(&self, job_id: JobId) {
        self.jobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }

    /// Signal the job's backend to stop. Returns false if the job has no
    /// registered token (not started, or already finished).
    pub fn request_abort(&self, job_id: JobId) -> bool {
        match self
            .jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
        {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of jobs currently registered.
    pub fn active(&self) -> usize {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

//! Job scheduler and worker pool.
//!
//! A single dispatch task pulls job ids from the FIFO queue and keeps at most
//! `max_concurrent` workers in flight. Each worker runs one job's download on
//! a blocking thread and records the outcome in the registry. A failing or
//! panicking download only ever affects its own job.

mod dispatch;
mod guard;
mod worker;

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::control::JobControl;
use crate::downloader::Backends;
use crate::proxy::ProxySource;
use crate::queue::JobQueueReceiver;
use crate::registry::JobRegistry;

/// State shared by the dispatch loop and every worker.
pub(crate) struct WorkerContext {
    pub registry: Arc<JobRegistry>,
    pub control: Arc<JobControl>,
    pub backends: Backends,
    pub proxy_source: Option<Arc<dyn ProxySource>>,
    /// Soft limit on one download; None waits forever.
    pub worker_timeout: Option<Duration>,
}

/// Handle to the running dispatch loop.
pub(crate) struct Scheduler {
    shutdown: CancellationToken,
    handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Starts the dispatch loop on the current Tokio runtime.
    pub fn spawn(
        ctx: Arc<WorkerContext>,
        queue: JobQueueReceiver,
        max_concurrent: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let max_concurrent = max_concurrent.max(1);
        let handle = tokio::spawn(dispatch::run_dispatch_loop(
            ctx,
            queue,
            max_concurrent,
            shutdown.clone(),
        ));
        tracing::debug!(max_concurrent, "scheduler started");
        Self {
            shutdown,
            handle: tokio::sync::Mutex::new(Some(handle)),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Stops admission and trips every active job's token without waiting.
    pub fn signal_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Signals shutdown and waits up to `timeout` for in-flight workers.
    /// Returns false if workers were still busy when the timeout expired; they
    /// are then detached.
    pub async fn stop(&self, timeout: Duration) -> bool {
        self.signal_shutdown();
        let Some(mut handle) = self.handle.lock().await.take() else {
            return true;
        };
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!("dispatch loop ended abnormally: {}", e);
                true
            }
            Err(_) => {
                handle.abort();
                tracing::warn!(
                    "workers still busy {}ms after stop; detaching them",
                    timeout.as_millis()
                );
                false
            }
        }
    }
}

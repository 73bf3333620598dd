//! Dispatch loop: FIFO admission into a bounded set of workers.

use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::job::{JobId, JobStatus};
use crate::queue::JobQueueReceiver;

use super::guard::ControlGuard;
use super::worker::run_job;
use super::WorkerContext;

/// Moves a queued job to `downloading` and registers its cancellation token.
///
/// The token is registered before the transition so that a cancel racing with
/// dispatch either sees `queued` (and the claim fails) or sees `downloading`
/// and finds a token to trip. Returns None if the job is no longer queued.
fn claim(ctx: &Arc<WorkerContext>, id: JobId) -> Option<(CancellationToken, ControlGuard)> {
    let token = ctx.control.register(id);
    let guard = ControlGuard {
        control: Arc::clone(&ctx.control),
        job_id: id,
    };
    let claimed = ctx
        .registry
        .update(id, |job| job.transition(JobStatus::Downloading))
        .unwrap_or(false);
    if !claimed {
        tracing::debug!("skipping job {} (no longer queued)", id);
        return None;
    }
    Some((token, guard))
}

/// Runs until shutdown is signalled or the queue is closed and drained.
/// After shutdown no new job is admitted; in-flight workers are awaited.
pub(super) async fn run_dispatch_loop(
    ctx: Arc<WorkerContext>,
    mut queue: JobQueueReceiver,
    max_concurrent: usize,
    shutdown: CancellationToken,
) {
    let mut workers = JoinSet::new();
    let mut open = true;

    loop {
        if !open && workers.is_empty() {
            break;
        }
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("worker task failed: {}", e);
                }
            }
            next = queue.recv(), if open && workers.len() < max_concurrent => {
                match next {
                    Some(id) => {
                        if let Some((token, guard)) = claim(&ctx, id) {
                            tracing::debug!(
                                active = workers.len() + 1,
                                "dispatching job {}",
                                id
                            );
                            workers.spawn(run_job(Arc::clone(&ctx), id, token, guard));
                        }
                    }
                    None => open = false,
                }
            }
        }
    }

    queue.close();
    if !workers.is_empty() {
        tracing::info!("waiting for {} active download(s) to stop", workers.len());
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::error!("worker task failed: {}", e);
        }
    }
    tracing::debug!("scheduler stopped");
}

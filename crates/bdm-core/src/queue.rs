//! FIFO admission queue of job ids between the façade and the dispatch loop.
//!
//! Unbounded by default. With `max_depth` set, `push` refuses new ids once that
//! many are waiting, which gives callers a backpressure signal instead of
//! letting the queue grow without limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::job::JobId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue is full ({depth} jobs waiting)")]
    Full { depth: usize },
    #[error("queue is closed")]
    Closed,
}

/// Producer half.
#[derive(Debug, Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<JobId>,
    depth: Arc<AtomicUsize>,
    max_depth: Option<usize>,
}

/// Consumer half, owned by the dispatch loop.
#[derive(Debug)]
pub struct JobQueueReceiver {
    rx: mpsc::UnboundedReceiver<JobId>,
    depth: Arc<AtomicUsize>,
}

/// Creates a connected queue. `max_depth` of `Some(0)` is treated as 1.
pub fn job_queue(max_depth: Option<usize>) -> (JobQueue, JobQueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        JobQueue {
            tx,
            depth: Arc::clone(&depth),
            max_depth: max_depth.map(|d| d.max(1)),
        },
        JobQueueReceiver { rx, depth },
    )
}

impl JobQueue {
    pub fn push(&self, id: JobId) -> Result<(), QueueError> {
        let mut current = self.depth.load(Ordering::Relaxed);
        loop {
            if let Some(max) = self.max_depth {
                if current >= max {
                    return Err(QueueError::Full { depth: current });
                }
            }
            match self.depth.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
        if self.tx.send(id).is_err() {
            self.depth.fetch_sub(1, Ordering::AcqRel);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    /// Ids pushed but not yet taken by the dispatch loop.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl JobQueueReceiver {
    /// Next id in submission order; None once every producer is gone or the
    /// queue was closed and drained.
    pub async fn recv(&mut self) -> Option<JobId> {
        let id = self.rx.recv().await?;
        self.depth.fetch_sub(1, Ordering::AcqRel);
        Some(id)
    }

    /// Refuses further pushes. Already queued ids can still be drained.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

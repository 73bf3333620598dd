//! RAII guard that drops a job's cancellation token when its worker ends.

use std::sync::Arc;

use crate::control::JobControl;
use crate::job::JobId;

/// Unregisters the job from `JobControl` when dropped, including when the
/// worker task is aborted.
pub(super) struct ControlGuard {
    pub(super) control: Arc<JobControl>,
    pub(super) job_id: JobId,
}

impl Drop for ControlGuard {
    fn drop(&mut self) {
        self.control.unregister(self.job_id);
    }
}

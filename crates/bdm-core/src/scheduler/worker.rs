//! One worker: resolve proxy, run the download, record the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::downloader::{DownloadError, DownloadRequest};
use crate::job::{Job, JobId, JobStatus};

use super::guard::ControlGuard;
use super::WorkerContext;

/// Job's own proxy if it has one; otherwise one from the proxy source, which is
/// written back to the job while it is still downloading.
fn resolve_proxy(ctx: &WorkerContext, job: &Job) -> Option<String> {
    if let Some(p) = &job.proxy {
        return Some(p.clone());
    }
    let proxy = ctx.proxy_source.as_ref()?.get_proxy()?;
    ctx.registry.update(job.id, |j| {
        if j.status == JobStatus::Downloading && j.proxy.is_none() {
            j.proxy = Some(proxy.clone());
        }
    });
    tracing::debug!("job {} assigned proxy {}", job.id, proxy);
    Some(proxy)
}

/// Writes the terminal state for `id`. A job that was cancelled while in
/// flight keeps its `cancelled` status whatever the backend returned.
fn record_outcome(
    ctx: &WorkerContext,
    id: JobId,
    result: Result<PathBuf, DownloadError>,
    proxy: Option<&str>,
) {
    match result {
        Ok(path) => {
            let completed = ctx
                .registry
                .update(id, |job| job.complete(path.clone()))
                .unwrap_or(false);
            if completed {
                tracing::info!("job {} completed: {}", id, path.display());
            } else {
                tracing::debug!("job {} finished after it was cancelled or cleared", id);
            }
        }
        Err(DownloadError::Cancelled) => {
            ctx.registry.update(id, |job| job.cancel());
            tracing::info!("job {} cancelled", id);
        }
        Err(e) => {
            let message = e.to_string();
            let failed = ctx
                .registry
                .update(id, |job| job.fail(message.clone()))
                .unwrap_or(false);
            if !failed {
                tracing::debug!("job {} errored after it was cancelled: {}", id, message);
                return;
            }
            tracing::warn!("job {} failed: {}", id, message);
            if let (Some(proxy), Some(source)) = (proxy, ctx.proxy_source.as_ref()) {
                source.mark_failure(proxy);
            }
        }
    }
}

/// Processes one claimed job. The job is already `downloading`.
pub(super) async fn run_job(
    ctx: Arc<WorkerContext>,
    id: JobId,
    cancel: CancellationToken,
    _guard: ControlGuard,
) {
    let Some(job) = ctx.registry.get(id) else {
        return;
    };
    let Some(downloader) = ctx.backends.get(job.backend) else {
        record_outcome(&ctx, id, Err(DownloadError::Unavailable(job.backend)), None);
        return;
    };
    // Cancelled between claim and here: no proxy is consumed and no thread started.
    if cancel.is_cancelled() {
        record_outcome(&ctx, id, Err(DownloadError::Cancelled), None);
        return;
    }

    let proxy = resolve_proxy(&ctx, &job);
    let request = DownloadRequest {
        job_id: id,
        url: job.url.clone(),
        format: job.format.clone(),
        proxy: proxy.clone(),
        subtitles: job.subtitles,
    };
    if cancel.is_cancelled() {
        record_outcome(&ctx, id, Err(DownloadError::Cancelled), proxy.as_deref());
        return;
    }
    tracing::info!("job {} started on {} backend: {}", id, job.backend, job.url);

    let registry = Arc::clone(&ctx.registry);
    let token = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        let mut on_progress = |done: u64, total: u64| {
            registry.update(id, |j| j.record_progress(done, total));
        };
        downloader.download(&request, &mut on_progress, &token)
    });

    let joined = match ctx.worker_timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                // The blocking thread cannot be aborted; trip its token and move on.
                cancel.cancel();
                Ok(Err(DownloadError::TimedOut(limit)))
            }
        },
        None => task.await,
    };

    let result = joined.unwrap_or_else(|e| {
        let cause = if e.is_panic() {
            "download worker panicked"
        } else {
            "download worker was aborted"
        };
        tracing::error!("job {}: {}", id, cause);
        Err(DownloadError::Failed(cause.to_string()))
    });
    record_outcome(&ctx, id, result, proxy.as_deref());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::control::JobControl;
    use crate::downloader::{BackendKind, Backends, Downloader};
    use crate::job::JobOptions;
    use crate::proxy::ProxySource;
    use crate::registry::JobRegistry;

    #[derive(Default)]
    struct CountingDownloader {
        calls: AtomicUsize,
    }

    impl Downloader for CountingDownloader {
        fn kind(&self) -> BackendKind {
            BackendKind::MultiConnection
        }

        fn download(
            &self,
            _request: &DownloadRequest,
            _on_progress: &mut dyn FnMut(u64, u64),
            _cancel: &CancellationToken,
        ) -> Result<PathBuf, DownloadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from("/downloads/out"))
        }
    }

    #[derive(Default)]
    struct CountingProxies {
        handed_out: AtomicUsize,
    }

    impl ProxySource for CountingProxies {
        fn get_proxy(&self) -> Option<String> {
            self.handed_out.fetch_add(1, Ordering::SeqCst);
            Some("http://10.0.0.1:3128".to_string())
        }

        fn mark_failure(&self, _proxy: &str) {}
    }

    fn context(
        downloader: Arc<CountingDownloader>,
        proxies: Arc<CountingProxies>,
    ) -> Arc<WorkerContext> {
        let mut backends = Backends::new();
        backends.register(downloader);
        let source: Arc<dyn ProxySource> = proxies;
        Arc::new(WorkerContext {
            registry: Arc::new(JobRegistry::new()),
            control: Arc::new(JobControl::new(CancellationToken::new())),
            backends,
            proxy_source: Some(source),
            worker_timeout: None,
        })
    }

    /// Creates a job and moves it to `downloading` the way dispatch does.
    fn claimed(ctx: &Arc<WorkerContext>) -> (JobId, CancellationToken, ControlGuard) {
        let job = Job::new(
            "https://files.example.com/a.iso",
            BackendKind::MultiConnection,
            JobOptions::default(),
        );
        let id = ctx.registry.create(job).unwrap();
        let token = ctx.control.register(id);
        ctx.registry.update(id, |j| j.transition(JobStatus::Downloading));
        let guard = ControlGuard {
            control: Arc::clone(&ctx.control),
            job_id: id,
        };
        (id, token, guard)
    }

    #[tokio::test]
    async fn cancelled_before_start_takes_no_proxy_and_no_thread() {
        let downloader = Arc::new(CountingDownloader::default());
        let proxies = Arc::new(CountingProxies::default());
        let ctx = context(Arc::clone(&downloader), Arc::clone(&proxies));
        let (id, token, guard) = claimed(&ctx);

        token.cancel();
        run_job(Arc::clone(&ctx), id, token, guard).await;

        let job = ctx.registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.proxy.is_none());
        assert_eq!(proxies.handed_out.load(Ordering::SeqCst), 0);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(ctx.control.active(), 0);
    }

    #[tokio::test]
    async fn live_token_runs_the_download() {
        let downloader = Arc::new(CountingDownloader::default());
        let proxies = Arc::new(CountingProxies::default());
        let ctx = context(Arc::clone(&downloader), Arc::clone(&proxies));
        let (id, token, guard) = claimed(&ctx);

        run_job(Arc::clone(&ctx), id, token, guard).await;

        let job = ctx.registry.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.proxy.as_deref(), Some("http://10.0.0.1:3128"));
        assert_eq!(proxies.handed_out.load(Ordering::SeqCst), 1);
        assert_eq!(downloader.calls.load(Ordering::SeqCst), 1);
    }
}

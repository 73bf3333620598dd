//! Scripted backends and proxy sources for driving the engine without network access.
//!
//! `ScriptedDownloader` decides what to do from the last path segment of the URL:
//! `fail` errors with "x", `block` waits for cancellation, `hang` ignores
//! cancellation for a while, `panic` panics, anything else succeeds after
//! reporting progress in four steps.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bdm_core::{
    BackendKind, BatchManager, BatchSettings, Backends, DownloadError, DownloadRequest, Downloader,
    Job, JobId, JobStatus, ProxySource,
};
use tokio_util::sync::CancellationToken;

pub const TOTAL_BYTES: u64 = 4096;

#[derive(Default)]
pub struct Observed {
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub started: Mutex<Vec<String>>,
    pub proxies: Mutex<Vec<Option<String>>>,
}

impl Observed {
    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub struct ScriptedDownloader {
    kind: BackendKind,
    step: Duration,
    pub observed: Arc<Observed>,
}

impl ScriptedDownloader {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            step: Duration::from_millis(10),
            observed: Arc::new(Observed::default()),
        }
    }

    /// Delay between progress steps; a successful job takes four steps.
    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    fn script(&self, request: &DownloadRequest) -> String {
        request
            .url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    }

    fn run(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(u64, u64),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        match self.script(request).as_str() {
            "fail" => {
                std::thread::sleep(self.step);
                Err(DownloadError::Failed("x".to_string()))
            }
            "block" => {
                while !cancel.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.observed.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::Cancelled)
            }
            "hang" => {
                std::thread::sleep(Duration::from_millis(500));
                Ok(PathBuf::from("hang.bin"))
            }
            "panic" => panic!("backend exploded"),
            name => {
                for i in 1..=4u64 {
                    if cancel.is_cancelled() {
                        self.observed.cancelled.fetch_add(1, Ordering::SeqCst);
                        return Err(DownloadError::Cancelled);
                    }
                    std::thread::sleep(self.step);
                    on_progress(TOTAL_BYTES / 4 * i, TOTAL_BYTES);
                    // A stale, smaller report must not move progress backwards.
                    on_progress(TOTAL_BYTES / 8, TOTAL_BYTES);
                }
                Ok(PathBuf::from(format!("/downloads/{name}")))
            }
        }
    }
}

impl Downloader for ScriptedDownloader {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(u64, u64),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        let obs = &self.observed;
        obs.started.lock().unwrap().push(request.url.clone());
        obs.proxies.lock().unwrap().push(request.proxy.clone());
        let now = obs.active.fetch_add(1, Ordering::SeqCst) + 1;
        obs.max_active.fetch_max(now, Ordering::SeqCst);
        let result = self.run(request, on_progress, cancel);
        obs.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Always hands out the same proxy and records every failure report.
pub struct RecordingProxySource {
    proxy: String,
    pub handed_out: AtomicUsize,
    pub failures: Mutex<Vec<String>>,
}

impl RecordingProxySource {
    pub fn new(proxy: &str) -> Self {
        Self {
            proxy: proxy.to_string(),
            handed_out: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
        }
    }

    pub fn failures(&self) -> Vec<String> {
        self.failures.lock().unwrap().clone()
    }
}

impl ProxySource for RecordingProxySource {
    fn get_proxy(&self) -> Option<String> {
        self.handed_out.fetch_add(1, Ordering::SeqCst);
        Some(self.proxy.clone())
    }

    fn mark_failure(&self, proxy: &str) {
        self.failures.lock().unwrap().push(proxy.to_string());
    }
}

/// Engine with one scripted multi-connection backend.
pub fn start(
    settings: BatchSettings,
    proxy_source: Option<Arc<dyn ProxySource>>,
) -> (BatchManager, Arc<Observed>) {
    start_with(settings, ScriptedDownloader::new(BackendKind::MultiConnection), proxy_source)
}

pub fn start_with(
    settings: BatchSettings,
    downloader: ScriptedDownloader,
    proxy_source: Option<Arc<dyn ProxySource>>,
) -> (BatchManager, Arc<Observed>) {
    let observed = Arc::clone(&downloader.observed);
    let mut backends = Backends::new();
    backends.register(Arc::new(downloader));
    (BatchManager::start(settings, backends, proxy_source), observed)
}

pub fn settings(max_concurrent: usize) -> BatchSettings {
    BatchSettings {
        max_concurrent,
        stop_timeout: Duration::from_secs(2),
        ..BatchSettings::default()
    }
}

pub fn url(script: &str) -> String {
    format!("https://files.example.com/{script}")
}

/// Polls until `check` holds; panics after `timeout`.
pub async fn wait_until<F>(timeout: Duration, mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while !check() {
        assert!(Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub async fn wait_idle(manager: &BatchManager) {
    wait_until(Duration::from_secs(5), || manager.is_idle()).await;
}

pub async fn wait_for_status(manager: &BatchManager, id: JobId, status: JobStatus) -> Job {
    wait_until(Duration::from_secs(5), || {
        manager.query(id).is_some_and(|j| j.status == status)
    })
    .await;
    manager.query(id).expect("job exists")
}

//! Downloader capability: the pluggable backends that perform one job's transfer.
//!
//! Backends are selected by an explicit `BackendKind` tag, resolved once when a
//! job is created. A backend runs on a blocking worker thread, reports progress
//! through a synchronous callback, and should poll the cancellation token; one
//! that never polls it simply keeps running until its transfer ends.

mod aria2;
mod parse;
mod process;
mod ytdlp;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::job::{BackendChoice, JobId};
use crate::url_model;

pub use aria2::Aria2Downloader;
pub use parse::{parse_aria2_completed, parse_aria2_progress, parse_size, parse_ytdlp_progress};
pub use ytdlp::{YtDlpDownloader, DEFAULT_FORMAT, DEFAULT_PREFERRED_CODEC};

/// Backend family a job runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Direct file transfer over several connections (aria2).
    MultiConnection,
    /// Page-level media extraction (yt-dlp).
    Extractor,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::MultiConnection => "multi_connection",
            BackendKind::Extractor => "extractor",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Everything a backend needs to run one job.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub job_id: JobId,
    pub url: String,
    pub format: Option<String>,
    pub proxy: Option<String>,
    pub subtitles: bool,
}

/// Backend-reported failure.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Network, extraction or format failure reported by the backend.
    #[error("{0}")]
    Failed(String),
    /// The transfer stopped because its cancellation token fired.
    #[error("download cancelled")]
    Cancelled,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no {0} backend is available")]
    Unavailable(BackendKind),
    #[error("download timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

/// One backend. Implementations are shared across workers and may be called
/// concurrently for different jobs.
pub trait Downloader: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Runs the transfer to completion and returns the produced file.
    /// `on_progress(downloaded, total)` may be called any number of times;
    /// `total` is 0 while unknown.
    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(u64, u64),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError>;
}

/// Registered backends, keyed by kind, plus the host list used to route URLs
/// to the extractor.
#[derive(Clone)]
pub struct Backends {
    by_kind: HashMap<BackendKind, Arc<dyn Downloader>>,
    extractor_hosts: Vec<String>,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            by_kind: HashMap::new(),
            extractor_hosts: url_model::DEFAULT_EXTRACTOR_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extractor_hosts(mut self, hosts: Vec<String>) -> Self {
        self.extractor_hosts = hosts;
        self
    }

    /// Registers `downloader` under its own kind, replacing any previous one.
    pub fn register(&mut self, downloader: Arc<dyn Downloader>) -> &mut Self {
        self.by_kind.insert(downloader.kind(), downloader);
        self
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Downloader>> {
        self.by_kind.get(&kind).cloned()
    }

    pub fn contains(&self, kind: BackendKind) -> bool {
        self.by_kind.contains_key(&kind)
    }

    /// Picks the backend for a new job:
    /// an explicit multi-connection request is honoured when that backend is
    /// registered; otherwise extractor-host URLs go to the extractor and
    /// everything else to multi-connection. An unregistered pick fails the job
    /// at dispatch, not here.
    pub fn resolve(&self, choice: BackendChoice, url: &str) -> BackendKind {
        match choice {
            BackendChoice::Extractor => BackendKind::Extractor,
            BackendChoice::MultiConnection if self.contains(BackendKind::MultiConnection) => {
                BackendKind::MultiConnection
            }
            BackendChoice::MultiConnection | BackendChoice::Auto => {
                if url_model::is_extractor_url(url, &self.extractor_hosts) {
                    BackendKind::Extractor
                } else {
                    BackendKind::MultiConnection
                }
            }
        }
    }
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.by_kind.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("Backends")
            .field("kinds", &kinds)
            .field("extractor_hosts", &self.extractor_hosts)
            .finish()
    }
}

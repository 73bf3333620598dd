//! Job records: identity, per-job options, lifecycle state and progress fields.
//!
//! A `Job` is plain data. The registry owns the only live copy of each job;
//! everything handed to callers is a snapshot clone.

mod progress;
mod state;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::downloader::BackendKind;

pub use progress::ProgressStats;
pub use state::JobStatus;

/// Opaque, globally unique job identifier (UUIDv4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

/// Which backend the caller asked for. Resolved to a concrete `BackendKind`
/// once, when the job is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendChoice {
    /// Extractor for recognised video hosts, multi-connection for everything else.
    #[default]
    Auto,
    /// Prefer the multi-connection backend when it is registered.
    MultiConnection,
    /// Always use the extractor backend.
    Extractor,
}

/// Per-job parameters supplied at submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default)]
    pub backend: BackendChoice,
    /// Format selector passed to the extractor backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Explicit proxy; when absent one may be assigned from the proxy source at dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    #[serde(default)]
    pub subtitles: bool,
}

/// One tracked download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub status: JobStatus,
    /// Percentage in [0, 100].
    pub progress: f64,
    pub downloaded_bytes: u64,
    /// 0 until the backend reports a size.
    pub total_bytes: u64,
    /// Bytes per second since `started_at`. Advisory.
    pub speed: f64,
    /// Estimated seconds remaining. Advisory.
    pub eta: Option<u64>,
    pub added_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub backend: BackendKind,
    pub format: Option<String>,
    pub proxy: Option<String>,
    pub subtitles: bool,
    pub output_file: Option<PathBuf>,
    pub error: Option<String>,
}

impl Job {
    /// New queued job with all counters zeroed.
    pub fn new(url: impl Into<String>, backend: BackendKind, options: JobOptions) -> Self {
        Self {
            id: JobId::new(),
            url: url.into(),
            status: JobStatus::Queued,
            progress: 0.0,
            downloaded_bytes: 0,
            total_bytes: 0,
            speed: 0.0,
            eta: None,
            added_at: Utc::now(),
            started_at: None,
            completed_at: None,
            backend,
            format: options.format,
            proxy: options.proxy,
            subtitles: options.subtitles,
            output_file: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the job to `next` if the state machine allows it, stamping
    /// `started_at` / `completed_at`. Returns false (and changes nothing) otherwise.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        let now = Utc::now();
        if next == JobStatus::Downloading {
            self.started_at = Some(now);
        } else if next.is_terminal() {
            self.completed_at = Some(now);
        }
        true
    }

    /// `downloading → completed`, recording the produced file.
    pub fn complete(&mut self, output_file: PathBuf) -> bool {
        if !self.transition(JobStatus::Completed) {
            return false;
        }
        self.progress = 100.0;
        if self.total_bytes > 0 {
            self.downloaded_bytes = self.total_bytes;
        }
        self.speed = 0.0;
        self.eta = Some(0);
        self.output_file = Some(output_file);
        true
    }

    /// Moves to `failed` and records the cause.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.transition(JobStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        self.speed = 0.0;
        self.eta = None;
        true
    }

    /// Moves to `cancelled` from `queued` or `downloading`.
    pub fn cancel(&mut self) -> bool {
        if !self.transition(JobStatus::Cancelled) {
            return false;
        }
        self.speed = 0.0;
        self.eta = None;
        true
    }

    /// Applies a backend progress report. Ignored unless the job is downloading;
    /// `progress` never moves backwards.
    pub fn record_progress(&mut self, downloaded: u64, total: u64) {
        if self.status != JobStatus::Downloading {
            return;
        }
        self.downloaded_bytes = downloaded;
        if total > 0 {
            self.total_bytes = total;
        }
        let elapsed_secs = self
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as f64 / 1000.0)
            .unwrap_or(0.0);
        let stats = ProgressStats {
            bytes_done: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            elapsed_secs,
        };
        if let Some(pct) = stats.percent() {
            self.progress = self.progress.max(pct);
        }
        self.speed = stats.bytes_per_sec();
        self.eta = stats.eta_secs().map(|s| s.round() as u64);
    }
}

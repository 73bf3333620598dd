//! Batch download engine: queue many URLs, run them on a bounded worker pool
//! through pluggable backends, and track each job from submission to a
//! terminal outcome.

pub mod batch;
pub mod config;
pub mod control;
pub mod downloader;
pub mod job;
pub mod logging;
pub mod proxy;
pub mod queue;
pub mod registry;
pub mod source;
pub mod url_model;

pub(crate) mod scheduler;

pub use batch::{BatchError, BatchManager, BatchSettings, BatchStats, CancelError};
pub use downloader::{BackendKind, Backends, DownloadError, DownloadRequest, Downloader};
pub use job::{BackendChoice, Job, JobId, JobOptions, JobStatus};
pub use proxy::{ProxyPool, ProxySource};
pub use source::{SourceError, UrlListFile, UrlListSource};

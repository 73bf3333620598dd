use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::batch::BatchSettings;
use crate::downloader::{DEFAULT_FORMAT, DEFAULT_PREFERRED_CODEC};
use crate::proxy::DEFAULT_MAX_FAILURES;
use crate::url_model::DEFAULT_EXTRACTOR_HOSTS;

/// `[aria2]` section: the multi-connection backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Aria2Config {
    /// Program name or path of `aria2c`.
    pub path: PathBuf,
    pub enabled: bool,
    /// Connections per server (`--max-connection-per-server`).
    pub max_connections: u32,
    /// Pieces per download (`--split`).
    pub split: u32,
}

impl Default for Aria2Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("aria2c"),
            enabled: true,
            max_connections: 4,
            split: 4,
        }
    }
}

/// `[ytdlp]` section: the extractor backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YtDlpConfig {
    pub path: PathBuf,
    /// Format selector used when a job does not give one.
    pub format: String,
    /// Container videos are recoded to; empty disables recoding.
    pub preferred_codec: String,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("yt-dlp"),
            format: DEFAULT_FORMAT.to_string(),
            preferred_codec: DEFAULT_PREFERRED_CODEC.to_string(),
        }
    }
}

/// `[proxy]` section. Both inline proxies and a proxy file may be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub proxies: Vec<String>,
    pub file: Option<PathBuf>,
    /// Failures after which a proxy is no longer reinstated.
    pub max_failures: u32,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            proxies: Vec::new(),
            file: None,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

/// Global configuration loaded from `~/.config/bdm/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BdmConfig {
    /// Where downloads are written; None = current directory.
    pub download_dir: Option<PathBuf>,
    /// Maximum simultaneous downloads.
    pub max_concurrent: usize,
    /// Optional cap on jobs waiting for a worker.
    pub max_queue_depth: Option<usize>,
    /// Optional per-download time limit in seconds.
    pub worker_timeout_secs: Option<u64>,
    /// Grace period for in-flight downloads on shutdown.
    pub stop_timeout_secs: u64,
    /// Hosts routed to the extractor backend.
    pub extractor_hosts: Vec<String>,
    /// Proxy for jobs submitted without one, ahead of the proxy pool.
    pub default_proxy: Option<String>,
    pub aria2: Aria2Config,
    pub ytdlp: YtDlpConfig,
    pub proxy: ProxyConfig,
}

impl Default for BdmConfig {
    fn default() -> Self {
        Self {
            download_dir: None,
            max_concurrent: 3,
            max_queue_depth: None,
            worker_timeout_secs: None,
            stop_timeout_secs: 5,
            extractor_hosts: DEFAULT_EXTRACTOR_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            default_proxy: None,
            aria2: Aria2Config::default(),
            ytdlp: YtDlpConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl BdmConfig {
    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            max_concurrent: self.max_concurrent.max(1),
            max_queue_depth: self.max_queue_depth,
            worker_timeout: self.worker_timeout_secs.map(Duration::from_secs),
            stop_timeout: Duration::from_secs(self.stop_timeout_secs),
        }
    }

    /// The job proxy: `explicit` if given, else a non-blank `default_proxy`.
    pub fn job_proxy(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| {
            self.default_proxy
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
        })
    }

    /// Download directory, falling back to the current directory.
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("bdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BdmConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

//! `bdm download` – run a batch to completion with live progress.

use anyhow::{bail, Context, Result};
use bdm_core::config::BdmConfig;
use bdm_core::downloader::{Aria2Downloader, YtDlpDownloader};
use bdm_core::url_model;
use bdm_core::{
    BackendKind, BatchManager, Backends, Job, JobOptions, JobStatus, ProxyPool, ProxySource,
    UrlListFile, UrlListSource,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cli::DownloadArgs;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Registers every backend whose program is present. Errors if none is.
fn build_backends(cfg: &BdmConfig, download_dir: &Path) -> Result<Backends> {
    let mut backends = Backends::new().with_extractor_hosts(cfg.extractor_hosts.clone());

    if cfg.aria2.enabled {
        let aria2 = Aria2Downloader::new(&cfg.aria2.path, download_dir)
            .with_connections(cfg.aria2.max_connections, cfg.aria2.split);
        if aria2.is_available() {
            backends.register(Arc::new(aria2));
        } else {
            tracing::warn!("{} not found; direct downloads will fail", cfg.aria2.path.display());
        }
    }

    let ytdlp = YtDlpDownloader::new(&cfg.ytdlp.path, download_dir)
        .with_default_format(cfg.ytdlp.format.clone())
        .with_preferred_codec(cfg.ytdlp.preferred_codec.clone());
    if ytdlp.is_available() {
        backends.register(Arc::new(ytdlp));
    } else {
        tracing::warn!("{} not found; video pages will fail", cfg.ytdlp.path.display());
    }

    if !backends.contains(BackendKind::MultiConnection) && !backends.contains(BackendKind::Extractor)
    {
        bail!(
            "no download backend available: install aria2c or yt-dlp (or set their paths in {})",
            bdm_core::config::config_path()?.display()
        );
    }
    Ok(backends)
}

fn build_proxy_source(cfg: &BdmConfig, args: &DownloadArgs) -> Result<Option<Arc<dyn ProxySource>>> {
    let pool = ProxyPool::new(cfg.proxy.proxies.clone()).with_max_failures(cfg.proxy.max_failures);
    if let Some(path) = args.proxy_file.as_ref().or(cfg.proxy.file.as_ref()) {
        pool.add_from_file(path)?;
    }
    if pool.is_empty() {
        return Ok(None);
    }
    let source: Arc<dyn ProxySource> = Arc::new(pool);
    Ok(Some(source))
}

/// Command-line URLs followed by those read from `--file`.
fn requested_urls(args: &DownloadArgs) -> Result<Vec<String>> {
    let mut urls = args.urls.clone();
    if let Some(path) = &args.file {
        urls.extend(UrlListFile.read_urls(path)?);
    }
    Ok(urls)
}

fn format_rate(bytes_per_sec: f64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = 1024.0 * 1024.0;
    if bytes_per_sec >= MIB {
        format!("{:.2} MiB/s", bytes_per_sec / MIB)
    } else if bytes_per_sec >= KIB {
        format!("{:.1} KiB/s", bytes_per_sec / KIB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}

fn format_eta(eta: Option<u64>) -> String {
    match eta {
        Some(s) if s >= 3600 => format!("{}h{:02}m", s / 3600, (s % 3600) / 60),
        Some(s) if s >= 60 => format!("{}m{:02}s", s / 60, s % 60),
        Some(s) => format!("{s}s"),
        None => "?".to_string(),
    }
}

/// First 8 hex digits of the id; enough to tell jobs apart on screen.
fn short_id(job: &Job) -> String {
    job.id.to_string().chars().take(8).collect()
}

fn progress_line(job: &Job) -> String {
    format!(
        "  [{}] {:5.1}%  {:>12}  ETA {:<7} {}",
        short_id(job),
        job.progress,
        format_rate(job.speed),
        format_eta(job.eta),
        job.url
    )
}

fn print_progress(manager: &BatchManager) {
    let stats = manager.stats();
    println!(
        "{} downloading, {} queued, {} done, {} failed, {} cancelled",
        stats.downloading, stats.queued, stats.completed, stats.failed, stats.cancelled
    );
    for job in manager
        .query_all()
        .iter()
        .filter(|j| j.status == JobStatus::Downloading)
    {
        println!("{}", progress_line(job));
    }
}

fn print_summary(jobs: &[Job]) {
    println!("{:<10} {:<10} {:<17} {}", "ID", "STATUS", "BACKEND", "RESULT");
    for j in jobs {
        let result = match j.status {
            JobStatus::Completed => j
                .output_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            JobStatus::Failed => format!("{} ({})", j.url, j.error.as_deref().unwrap_or("error")),
            _ => j.url.clone(),
        };
        println!(
            "{:<10} {:<10} {:<17} {}",
            short_id(j),
            j.status,
            j.backend,
            result
        );
    }
}

/// Runs the batch. Returns true if any job failed.
pub async fn run_download(cfg: &BdmConfig, args: DownloadArgs) -> Result<bool> {
    if args.urls.is_empty() && args.file.is_none() {
        bail!("nothing to download: pass URLs or --file");
    }
    // Read before the engine starts: past `start` nothing returns ahead of `stop`.
    let urls = requested_urls(&args)?;

    let download_dir = args
        .download_dir
        .clone()
        .unwrap_or_else(|| cfg.resolved_download_dir());
    std::fs::create_dir_all(&download_dir)
        .with_context(|| format!("create download dir {}", download_dir.display()))?;

    let mut settings = cfg.batch_settings();
    if let Some(jobs) = args.jobs {
        settings.max_concurrent = jobs.max(1);
    }
    if let Some(secs) = args.timeout {
        settings.worker_timeout = Some(Duration::from_secs(secs));
    }

    let backends = build_backends(cfg, &download_dir)?;
    let proxy_source = build_proxy_source(cfg, &args)?;
    let manager = BatchManager::start(settings, backends, proxy_source);

    let options = JobOptions {
        backend: args.backend.into(),
        format: args.format.clone(),
        proxy: cfg.job_proxy(args.proxy.clone()),
        subtitles: args.subtitles,
    };
    let submitted = manager.submit_many(&urls, options);
    let results: Vec<_> = urls.into_iter().zip(submitted).collect();
    let mut queued = 0;
    for (url, result) in &results {
        match result {
            Ok(_) => {
                queued += 1;
                if !url_model::is_http_url(url) {
                    eprintln!("warning: {url} is not an http(s) URL; the backend may reject it");
                }
            }
            Err(e) => eprintln!("skipped {url}: {e}"),
        }
    }
    tracing::info!("queued {} of {} URL(s)", queued, results.len());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                eprintln!("interrupted; cancelling remaining downloads");
                break;
            }
            _ = ticker.tick() => {
                if manager.is_idle() {
                    break;
                }
                if !args.json {
                    print_progress(&manager);
                }
            }
        }
    }
    manager.stop().await;

    let jobs = manager.query_all();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    } else {
        print_summary(&jobs);
    }
    Ok(jobs.iter().any(|j| j.status == JobStatus::Failed))
}

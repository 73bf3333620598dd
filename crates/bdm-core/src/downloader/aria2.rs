//! Multi-connection backend driving `aria2c`.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tokio_util::sync::CancellationToken;

use super::parse::{parse_aria2_completed, parse_aria2_progress};
use super::process;
use super::{BackendKind, DownloadError, DownloadRequest, Downloader};
use crate::job::JobId;
use crate::url_model;

/// Output name for one job: the URL's file name with the first 8 hex digits
/// of the job id before the extension. Jobs for the same URL never share a file.
fn job_file_name(url: &str, job_id: JobId) -> String {
    let name = url_model::output_filename(url);
    let id = job_id.to_string();
    let tag = id.get(..8).unwrap_or(&id);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{stem}-{tag}.{ext}")
        }
        _ => format!("{name}-{tag}"),
    }
}

#[derive(Debug, Clone)]
pub struct Aria2Downloader {
    program: PathBuf,
    download_dir: PathBuf,
    max_connections: u32,
    split: u32,
}

impl Aria2Downloader {
    pub fn new(program: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            download_dir: download_dir.into(),
            max_connections: 4,
            split: 4,
        }
    }

    /// Connections per server and number of pieces per file (both at least 1).
    pub fn with_connections(mut self, max_connections: u32, split: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self.split = split.max(1);
        self
    }

    /// True if the program can be started (`aria2c --version` succeeds).
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self, url: &str, dir: &Path, file_name: &str, proxy: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--max-connection-per-server")
            .arg(self.max_connections.to_string())
            .arg("--split")
            .arg(self.split.to_string())
            .arg("--dir")
            .arg(dir)
            .arg("--out")
            .arg(file_name)
            .arg("--auto-file-renaming=false")
            .arg("--allow-overwrite=false")
            .arg("--summary-interval=1")
            .arg("--console-log-level=notice");
        if let Some(proxy) = proxy {
            cmd.arg("--all-proxy").arg(proxy);
        }
        cmd.arg(url);
        cmd
    }
}

impl Downloader for Aria2Downloader {
    fn kind(&self) -> BackendKind {
        BackendKind::MultiConnection
    }

    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(u64, u64),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        std::fs::create_dir_all(&self.download_dir)?;
        let file_name = job_file_name(&request.url, request.job_id);
        let program = self.program.display().to_string();
        let mut reported: Option<PathBuf> = None;

        let mut cmd = self.command(
            &request.url,
            &self.download_dir,
            &file_name,
            request.proxy.as_deref(),
        );
        let out = process::run(&program, &mut cmd, cancel, |line| {
            if let Some((done, total)) = parse_aria2_progress(line) {
                on_progress(done, total);
            } else if let Some(path) = parse_aria2_completed(line) {
                reported = Some(PathBuf::from(path));
            }
        })?;
        if !out.status.success() {
            return Err(out.failure(&program));
        }

        let output = reported.unwrap_or_else(|| self.download_dir.join(&file_name));
        let size = std::fs::metadata(&output)
            .map_err(|e| {
                DownloadError::Failed(format!(
                    "aria2c finished but {} is missing: {e}",
                    output.display()
                ))
            })?
            .len();
        on_progress(size, size);
        Ok(output)
    }
}

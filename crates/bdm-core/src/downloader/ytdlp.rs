//! Extractor backend driving `yt-dlp`.

use std::path::PathBuf;
use std::process::{Command, Stdio};
use tokio_util::sync::CancellationToken;

use super::parse::parse_ytdlp_progress;
use super::process;
use super::{BackendKind, DownloadError, DownloadRequest, Downloader};

pub const DEFAULT_FORMAT: &str = "bestvideo+bestaudio/best";
/// Container finished videos are converted to (`--recode-video`).
pub const DEFAULT_PREFERRED_CODEC: &str = "mp4";
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone)]
pub struct YtDlpDownloader {
    program: PathBuf,
    download_dir: PathBuf,
    default_format: String,
    preferred_codec: String,
}

impl YtDlpDownloader {
    pub fn new(program: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            download_dir: download_dir.into(),
            default_format: DEFAULT_FORMAT.to_string(),
            preferred_codec: DEFAULT_PREFERRED_CODEC.to_string(),
        }
    }

    /// Format used when a job does not name one.
    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into();
        self
    }

    /// Target container for `--recode-video`. Empty keeps whatever yt-dlp produced.
    pub fn with_preferred_codec(mut self, codec: impl Into<String>) -> Self {
        self.preferred_codec = codec.into().trim().to_string();
        self
    }

    /// True if the program can be started (`yt-dlp --version` succeeds).
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn command(&self, request: &DownloadRequest) -> Command {
        let format = request.format.as_deref().unwrap_or(&self.default_format);
        let mut cmd = Command::new(&self.program);
        cmd.args(["--newline", "--progress", "--no-playlist"])
            .args(["--print", "after_move:filepath"])
            .arg("-f")
            .arg(format)
            .arg("-o")
            .arg(self.download_dir.join(OUTPUT_TEMPLATE));
        if !self.preferred_codec.is_empty() {
            cmd.arg("--recode-video").arg(&self.preferred_codec);
        }
        if let Some(proxy) = request.proxy.as_deref() {
            cmd.arg("--proxy").arg(proxy);
        }
        if request.subtitles {
            cmd.args(["--write-subs", "--write-auto-subs", "--sub-langs", "en"]);
        }
        cmd.arg("--").arg(&request.url);
        cmd
    }
}

/// The file path printed by `--print after_move:filepath`: the last stdout
/// line that is not a bracketed status line.
fn printed_path(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('[') {
        return None;
    }
    Some(line)
}

impl Downloader for YtDlpDownloader {
    fn kind(&self) -> BackendKind {
        BackendKind::Extractor
    }

    fn download(
        &self,
        request: &DownloadRequest,
        on_progress: &mut dyn FnMut(u64, u64),
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DownloadError> {
        std::fs::create_dir_all(&self.download_dir)?;
        let program = self.program.display().to_string();
        let mut cmd = self.command(request);

        let mut output: Option<PathBuf> = None;
        let out = process::run(&program, &mut cmd, cancel, |line| {
            if let Some((done, total)) = parse_ytdlp_progress(line) {
                on_progress(done, total);
            } else if let Some(path) = printed_path(line) {
                output = Some(PathBuf::from(path));
            }
        })?;
        if !out.status.success() {
            return Err(out.failure(&program));
        }

        let output = output.ok_or_else(|| {
            DownloadError::Failed("yt-dlp did not report an output file".to_string())
        })?;
        if let Ok(meta) = std::fs::metadata(&output) {
            on_progress(meta.len(), meta.len());
        }
        Ok(output)
    }
}

//! CLI for the BDM batch download manager.

mod commands;

use anyhow::Result;
use bdm_core::{config, BackendChoice};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::{run_completions, run_config, run_download};

/// Top-level CLI for the BDM batch download manager.
#[derive(Debug, Parser)]
#[command(name = "bdm")]
#[command(about = "BDM: batch download manager for aria2c and yt-dlp", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download a batch of URLs and wait until every job finishes.
    Download(DownloadArgs),

    /// Print the config file path and the effective configuration.
    Config,

    /// Print shell completions to stdout.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    /// URLs to download.
    pub urls: Vec<String>,

    /// Read more URLs from a file (one per line, `#` comments allowed).
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Maximum simultaneous downloads (overrides config).
    #[arg(long, short = 'j', value_name = "N")]
    pub jobs: Option<usize>,

    /// Backend selection.
    #[arg(long, value_enum, default_value_t = BackendArg::Auto)]
    pub backend: BackendArg,

    /// Format selector for the extractor backend (e.g. "best[height<=720]").
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// Proxy for every job (e.g. http://host:3128); overrides `default_proxy`.
    #[arg(long, value_name = "URL")]
    pub proxy: Option<String>,

    /// Rotate through proxies listed in this file.
    #[arg(long, value_name = "PATH")]
    pub proxy_file: Option<PathBuf>,

    /// Also fetch subtitles (extractor backend).
    #[arg(long)]
    pub subtitles: bool,

    /// Where to save files (overrides config).
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Give up on a single download after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print final job snapshots as JSON instead of progress and a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    /// yt-dlp for known video hosts, aria2c otherwise.
    Auto,
    /// aria2c multi-connection transfer.
    Multi,
    /// yt-dlp media extraction.
    Extractor,
}

impl From<BackendArg> for BackendChoice {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => BackendChoice::Auto,
            BackendArg::Multi => BackendChoice::MultiConnection,
            BackendArg::Extractor => BackendChoice::Extractor,
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<ExitCode> {
        let cli = Cli::parse();
        if let CliCommand::Completions { shell } = cli.command {
            run_completions(shell);
            return Ok(ExitCode::SUCCESS);
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Download(args) => {
                let any_failed = run_download(&cfg, args).await?;
                if any_failed {
                    return Ok(ExitCode::FAILURE);
                }
            }
            CliCommand::Config => run_config(&cfg)?,
            CliCommand::Completions { .. } => {}
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[cfg(test)]
mod tests;

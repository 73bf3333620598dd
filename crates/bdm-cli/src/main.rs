use bdm_core::logging;
use std::process::ExitCode;

mod cli;

use crate::cli::CliCommand;

#[tokio::main]
async fn main() -> ExitCode {
    // File logging if possible; otherwise stderr so the CLI still runs.
    if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("log file unavailable ({e:#}); logging to stderr");
    }

    match CliCommand::run_from_args().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("bdm error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

//! CLI command handlers, one file per subcommand.

mod completions;
mod config;
mod download;

pub use completions::run_completions;
pub use config::run_config;
pub use download::run_download;

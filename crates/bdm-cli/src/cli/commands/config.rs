//! `bdm config` – show where the config lives and what it resolves to.

use anyhow::Result;
use bdm_core::config::{self, BdmConfig};

pub fn run_config(cfg: &BdmConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}

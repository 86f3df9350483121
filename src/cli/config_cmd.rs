//! Configuration display command.

use std::process::ExitCode;

use crate::config::HarvestConfig;

/// Print the effective configuration, after validating it.
pub fn cmd_show_config(config: &HarvestConfig) -> anyhow::Result<ExitCode> {
    config.validate()?;
    print!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}

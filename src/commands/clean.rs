//! Clean command - removes rendered output and digest records.

use anyhow::{Context, Result};
use std::fs;

use crate::config::Config;

/// Execute the clean command.
pub fn cmd_clean(config: &Config) -> Result<()> {
    if !config.output.exists() {
        println!("Nothing to clean: {} does not exist.", config.output.display());
        return Ok(());
    }

    fs::remove_dir_all(&config.output)
        .with_context(|| format!("Failed to remove {}", config.output.display()))?;
    println!("Removed {}", config.output.display());
    Ok(())
}

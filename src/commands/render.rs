//! Render command - writes the Containerfile without building.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

use crate::config::Config;
use crate::pipeline::render;
use crate::recipe::Recipe;

/// Execute the render command. With `to_stdout` the rendered file goes to
/// stdout only; nothing is written.
pub fn cmd_render(config: &Config, to_stdout: bool) -> Result<()> {
    let recipe = Recipe::load_or_default(&config.recipe_path)?;
    let rendered = render::containerfile(&recipe)?;

    if to_stdout {
        print!("{}", rendered);
        return Ok(());
    }

    let path = write_containerfile(config, &rendered)?;
    println!("Rendered {}", path.display());
    Ok(())
}

/// Write the rendered Containerfile into the output directory.
pub fn write_containerfile(config: &Config, rendered: &str) -> Result<PathBuf> {
    fs::create_dir_all(&config.output).with_context(|| {
        format!("Failed to create output directory {}", config.output.display())
    })?;
    let path = config.containerfile();
    fs::write(&path, rendered)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

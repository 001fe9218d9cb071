//! Show command - displays information.

use anyhow::Result;

use super::build::layer_statuses;
use crate::config::Config;
use crate::recipe::Recipe;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the effective recipe (defaults included)
    Recipe,
    /// Show layer staleness (what a rebuild would invalidate)
    Status,
}

/// Execute the show command.
pub fn cmd_show(config: &Config, target: ShowTarget) -> Result<()> {
    match target {
        ShowTarget::Config => {
            config.print();
        }
        ShowTarget::Recipe => {
            let recipe = Recipe::load_or_default(&config.recipe_path)?;
            println!("{}", serde_json::to_string_pretty(&recipe)?);
        }
        ShowTarget::Status => {
            let recipe = Recipe::load_or_default(&config.recipe_path)?;
            println!("Layer status (since last successful build):");
            for layer in layer_statuses(config, &recipe) {
                let state = if layer.stale { "STALE" } else { "fresh" };
                println!("  {:22} {}", layer.name, state);
            }
            println!();
            println!(
                "A stale dependency manifest invalidates the dependency layer;\n\
                 stale application source invalidates only the source layer."
            );
        }
    }
    Ok(())
}

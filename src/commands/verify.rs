//! Verify command - probes a built image against the recipe.

use anyhow::Result;

use crate::config::Config;
use crate::engine::Engine;
use crate::recipe::Recipe;
use crate::verify;

/// Execute the verify command. `tag` overrides the configured image tag.
pub fn cmd_verify(config: &Config, tag: Option<String>) -> Result<()> {
    let recipe = Recipe::load_or_default(&config.recipe_path)?;
    let engine = Engine::resolve(&config.engine)?;
    let tag = tag.unwrap_or_else(|| config.tag_for(&recipe));

    verify::verify_image_or_fail(engine, &recipe, &tag)
}

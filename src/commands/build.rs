//! Build command - renders the pipeline and drives the engine.

use anyhow::Result;
use std::time::Instant;

use super::render::write_containerfile;
use crate::cache;
use crate::config::Config;
use crate::engine::{self, Engine};
use crate::pipeline::render;
use crate::preflight;
use crate::recipe::Recipe;
use crate::verify;

/// Execute the build command.
///
/// Sequence: preflight, render, engine build, digest recording, then
/// verification probes unless skipped. Digests are recorded only after the
/// engine reports success, so a failed build never looks fresh.
pub fn cmd_build(config: &Config, skip_verify: bool) -> Result<()> {
    println!("=== kiln build ===\n");
    let start = Instant::now();

    preflight::run_preflight_or_fail(config)?;

    let recipe = Recipe::load_or_default(&config.recipe_path)?;
    let tag = config.tag_for(&recipe);
    let engine = Engine::resolve(&config.engine)?;

    println!("Rendering pipeline...");
    let rendered = render::containerfile(&recipe)?;
    let containerfile = write_containerfile(config, &rendered)?;
    println!("  {}", containerfile.display());

    report_staleness(config, &recipe);

    println!("\nBuilding {} with {}...", tag, engine.program());
    engine::build_image(engine, &containerfile, &config.context, &tag)?;

    record_digests(config, &recipe);

    if skip_verify {
        println!("\nSkipping verification (--skip-verify).");
    } else {
        println!();
        verify::verify_image_or_fail(engine, &recipe, &tag)?;
    }

    println!(
        "Build complete: {} ({}s)",
        tag,
        start.elapsed().as_secs()
    );
    Ok(())
}

/// Report which tracked layers changed since the last successful build.
fn report_staleness(config: &Config, recipe: &Recipe) {
    let layers = layer_statuses(config, recipe);
    let stale: Vec<&str> = layers
        .iter()
        .filter(|l| l.stale)
        .map(|l| l.name)
        .collect();
    if stale.is_empty() {
        println!("  All tracked layers unchanged since last build.");
    } else {
        println!("  Changed since last build: {}", stale.join(", "));
    }
}

/// Staleness of the three tracked inputs: recipe, manifest, source tree.
pub fn layer_statuses(config: &Config, recipe: &Recipe) -> Vec<cache::LayerStatus> {
    let (recipe_digest, manifest_digest, source_digest) = input_digests(config, recipe);

    vec![
        cache::LayerStatus {
            name: "recipe",
            stale: cache::is_stale(
                recipe_digest.as_deref(),
                &cache::record_path(&config.output, cache::RECIPE_RECORD),
            ),
        },
        cache::LayerStatus {
            name: "dependency manifest",
            stale: cache::is_stale(
                manifest_digest.as_deref(),
                &cache::record_path(&config.output, cache::MANIFEST_RECORD),
            ),
        },
        cache::LayerStatus {
            name: "application source",
            stale: cache::is_stale(
                source_digest.as_deref(),
                &cache::record_path(&config.output, cache::SOURCE_RECORD),
            ),
        },
    ]
}

fn input_digests(
    config: &Config,
    recipe: &Recipe,
) -> (Option<String>, Option<String>, Option<String>) {
    let recipe_digest = if config.recipe_path.exists() {
        cache::digest_file(&config.recipe_path)
    } else {
        // Built-in default: digest the effective recipe so edits to a
        // later-added file are still noticed.
        serde_json::to_string(recipe).ok().map(|json| {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(json.as_bytes());
            format!("{:x}", hasher.finalize())
        })
    };

    let manifest_digest = cache::digest_file(&config.context.join(&recipe.app.manifest));
    let source_digest = cache::digest_tree(&config.context, &[config.output.as_path()]).ok();

    (recipe_digest, manifest_digest, source_digest)
}

/// Record input digests after a successful build. Best effort: a failed
/// record only means the next status report over-approximates staleness.
fn record_digests(config: &Config, recipe: &Recipe) {
    let (recipe_digest, manifest_digest, source_digest) = input_digests(config, recipe);
    let records = [
        (cache::RECIPE_RECORD, recipe_digest),
        (cache::MANIFEST_RECORD, manifest_digest),
        (cache::SOURCE_RECORD, source_digest),
    ];
    for (name, digest) in records {
        if let Some(digest) = digest {
            let path = cache::record_path(&config.output, name);
            if let Err(e) = cache::record(&path, &digest) {
                eprintln!("  [WARN] Failed to record {}: {}", path.display(), e);
            }
        }
    }
}

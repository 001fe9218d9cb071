//! Preflight checks: validate the host and the build inputs before the
//! engine runs.
//!
//! A failed build after minutes of package downloads is a worse experience
//! than a failed check up front, so everything the pipeline needs is
//! checked here: the engine binary, the recipe, the pipeline ordering, the
//! dependency manifest and source tree, and the output directory.

use anyhow::{bail, Result};
use std::fs;

use crate::config::Config;
use crate::engine::Engine;
use crate::pipeline;
use crate::process::find_program;
use crate::recipe::Recipe;
use crate::report::{Check, Report};

/// Run all preflight checks.
pub fn run_preflight(config: &Config) -> Report {
    let mut report = Report::new("Preflight Check Results");

    println!("Running preflight checks...\n");

    check_engine(config, &mut report);
    let recipe = check_recipe(config, &mut report);
    check_pipeline(&mut report);
    if let Some(recipe) = recipe {
        check_context(config, &recipe, &mut report);
    }
    check_output(config, &mut report);

    println!();
    report
}

/// Run preflight and fail if any check fails.
pub fn run_preflight_or_fail(config: &Config) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!(
            "Preflight failed: {} check(s) failed. Fix the issues above before building.",
            report.fail_count()
        );
    }

    println!("All preflight checks passed!\n");
    Ok(())
}

fn check_engine(config: &Config, report: &mut Report) {
    println!("Checking container engine...");
    match Engine::resolve(&config.engine) {
        Ok(engine) => {
            let path = find_program(engine.program())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| engine.program().to_string());
            report.push(Check::pass_with("container engine", &path));
        }
        Err(e) => report.push(Check::fail("container engine", &format!("{:#}", e))),
    }
}

fn check_recipe(config: &Config, report: &mut Report) -> Option<Recipe> {
    println!("Checking recipe...");
    match Recipe::load_or_default(&config.recipe_path) {
        Ok(recipe) => {
            if config.recipe_path.exists() {
                report.push(Check::pass_with(
                    "recipe",
                    &config.recipe_path.display().to_string(),
                ));
            } else {
                report.push(Check::pass_with("recipe", "built-in default"));
            }
            Some(recipe)
        }
        Err(e) => {
            report.push(Check::fail("recipe", &format!("{:#}", e)));
            None
        }
    }
}

fn check_pipeline(report: &mut Report) {
    println!("Checking pipeline ordering...");
    let errors = pipeline::lint(pipeline::PIPELINE);
    if errors.is_empty() {
        report.push(Check::pass("pipeline ordering"));
    } else {
        let summary = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        report.push(Check::fail("pipeline ordering", &summary));
    }
}

fn check_context(config: &Config, recipe: &Recipe, report: &mut Report) {
    println!("Checking build context...");

    if !config.context.is_dir() {
        report.push(Check::fail(
            "build context",
            &format!("{} is not a directory", config.context.display()),
        ));
        return;
    }
    report.push(Check::pass_with(
        "build context",
        &config.context.display().to_string(),
    ));

    // The manifest is copied first and installed before the source tree; a
    // missing manifest is a guaranteed fatal copy step.
    let manifest = config.context.join(&recipe.app.manifest);
    match fs::read_to_string(&manifest) {
        Ok(content) => {
            let specs = content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .count();
            if specs == 0 {
                report.push(Check::warn(
                    "dependency manifest",
                    &format!("{} lists no packages", manifest.display()),
                ));
            } else {
                report.push(Check::pass_with(
                    "dependency manifest",
                    &format!("{} package spec(s)", specs),
                ));
            }
        }
        Err(_) => report.push(Check::fail(
            "dependency manifest",
            &format!("{} is missing or unreadable", manifest.display()),
        )),
    }

    let has_source = fs::read_dir(&config.context)
        .map(|mut entries| entries.any(|e| e.is_ok()))
        .unwrap_or(false);
    if has_source {
        report.push(Check::pass("application source"));
    } else {
        report.push(Check::fail(
            "application source",
            &format!("{} is empty", config.context.display()),
        ));
    }
}

fn check_output(config: &Config, report: &mut Report) {
    println!("Checking output directory...");
    match fs::create_dir_all(&config.output) {
        Ok(()) => {
            let probe = config.output.join(".kiln-write-probe");
            match fs::write(&probe, b"") {
                Ok(()) => {
                    let _ = fs::remove_file(&probe);
                    report.push(Check::pass_with(
                        "output directory",
                        &config.output.display().to_string(),
                    ));
                }
                Err(e) => report.push(Check::fail(
                    "output directory",
                    &format!("{} is not writable: {}", config.output.display(), e),
                )),
            }
        }
        Err(e) => report.push(Check::fail(
            "output directory",
            &format!("cannot create {}: {}", config.output.display(), e),
        )),
    }
}

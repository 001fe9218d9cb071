//! Lint command - recipe validation plus pipeline ordering checks, without
//! touching the engine.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::pipeline;
use crate::recipe::Recipe;
use crate::report::{Check, Report};

/// Execute the lint command.
pub fn cmd_lint(config: &Config) -> Result<()> {
    let mut report = Report::new("Lint Results");

    match Recipe::load_or_default(&config.recipe_path) {
        Ok(_) => report.push(Check::pass("recipe")),
        Err(e) => report.push(Check::fail("recipe", &format!("{:#}", e))),
    }

    let errors = pipeline::lint(pipeline::PIPELINE);
    if errors.is_empty() {
        report.push(Check::pass_with(
            "pipeline ordering",
            &format!("{} stages", pipeline::PIPELINE.len()),
        ));
    } else {
        for error in &errors {
            report.push(Check::fail("pipeline ordering", &error.to_string()));
        }
    }

    report.print();

    if !report.all_passed() {
        bail!("Lint failed: {} problem(s).", report.fail_count());
    }
    Ok(())
}

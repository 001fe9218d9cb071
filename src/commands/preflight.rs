//! Preflight command.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::preflight::run_preflight;

/// Execute the preflight command. With `strict`, warnings also fail.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    let report = run_preflight(config);
    report.print();

    if !report.all_passed() {
        bail!("Preflight failed: {} check(s) failed.", report.fail_count());
    }
    if strict && report.warn_count() > 0 {
        bail!(
            "Preflight strict mode: {} warning(s) treated as failures.",
            report.warn_count()
        );
    }

    println!("All preflight checks passed!");
    Ok(())
}

//! Post-build verification.
//!
//! The build already asserts the driver library exists; this module probes
//! the finished image the way a database client would find the driver at
//! connection time, plus the metadata the orchestrator reads. Checks:
//!
//! - the registered shared library exists and is readable in the image
//! - the registry stanza matches the recipe (name, `Driver=` path)
//! - the driver manager lists the registered driver
//! - the loader path variable equals the `Driver=` path's directory
//! - the declared port and default command in image metadata match the
//!   recipe
//!
//! If verification fails, fix the recipe or the build; do not drop the
//! failing probe. A verification that passes on a broken image lets the
//! opaque "driver not found" error ship to production.

use anyhow::{bail, Result};
use serde_json::Value;
use std::path::PathBuf;

use crate::engine::{self, Engine};
use crate::recipe::{Recipe, LOADER_PATH_VAR, REGISTRY_PATH};
use crate::report::{Check, Report};

/// One parsed driver registration stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDriver {
    pub name: String,
    pub description: Option<String>,
    pub library: Option<PathBuf>,
}

/// Parse a driver registry file (one `[Name]` stanza per driver).
pub fn parse_registry(content: &str) -> Vec<RegisteredDriver> {
    let mut drivers: Vec<RegisteredDriver> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            drivers.push(RegisteredDriver {
                name: name.to_string(),
                description: None,
                library: None,
            });
            continue;
        }
        let Some(current) = drivers.last_mut() else {
            continue;
        };
        if let Some((key, value)) = line.split_once('=') {
            match key.trim() {
                "Description" => current.description = Some(value.trim().to_string()),
                "Driver" => current.library = Some(PathBuf::from(value.trim())),
                _ => {}
            }
        }
    }

    drivers
}

/// Ports declared in image metadata (`Config.ExposedPorts` keys,
/// `<port>/tcp` form).
pub fn exposed_ports(inspect: &Value) -> Vec<u16> {
    inspect
        .pointer("/Config/ExposedPorts")
        .and_then(Value::as_object)
        .map(|ports| {
            ports
                .keys()
                .filter_map(|key| key.split('/').next())
                .filter_map(|port| port.parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Default command recorded in image metadata.
pub fn image_cmd(inspect: &Value) -> Vec<String> {
    inspect
        .pointer("/Config/Cmd")
        .and_then(Value::as_array)
        .map(|argv| {
            argv.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Probe a built image against its recipe.
pub fn verify_image(engine: Engine, recipe: &Recipe, tag: &str) -> Result<Report> {
    let mut report = Report::new("Image Verification Results");

    println!("Verifying {}...\n", tag);

    if !engine::image_exists(engine, tag) {
        bail!(
            "Image '{}' not found. Run 'kiln build' first.",
            tag
        );
    }

    let library = recipe.driver.library.display().to_string();

    // Driver library on disk, readable.
    println!("Probing driver library...");
    let probe = engine::run_in_image(engine, tag, &["test", "-r", library.as_str()])?;
    if probe.success() {
        report.push(Check::pass_with("driver library", &library));
    } else {
        report.push(Check::fail(
            "driver library",
            &format!("{} is missing or unreadable in the image", library),
        ));
    }

    // Registration record matches the recipe.
    println!("Probing driver registry...");
    let registry = engine::run_in_image(engine, tag, &["cat", REGISTRY_PATH])?;
    if registry.success() {
        let drivers = parse_registry(&registry.stdout);
        match drivers.iter().find(|d| d.name == recipe.driver.name) {
            Some(entry) if entry.library.as_deref() == Some(recipe.driver.library.as_path()) => {
                report.push(Check::pass_with("driver registration", &recipe.driver.name));
            }
            Some(entry) => {
                report.push(Check::fail(
                    "driver registration",
                    &format!(
                        "stanza '{}' points at {:?}, recipe says {}",
                        entry.name, entry.library, library
                    ),
                ));
            }
            None => {
                report.push(Check::fail(
                    "driver registration",
                    &format!("no stanza named '{}' in {}", recipe.driver.name, REGISTRY_PATH),
                ));
            }
        }
    } else {
        report.push(Check::fail(
            "driver registration",
            &format!("{} is missing in the image", REGISTRY_PATH),
        ));
    }

    // Driver manager introspection, the way a client resolves the driver.
    println!("Probing driver manager...");
    let listing = engine::run_in_image(engine, tag, &["odbcinst", "-q", "-d"])?;
    if !listing.success() {
        report.push(Check::skip(
            "driver manager listing",
            "odbcinst is not runnable in the image",
        ));
    } else if listing
        .stdout
        .lines()
        .any(|l| l.trim() == format!("[{}]", recipe.driver.name))
    {
        report.push(Check::pass("driver manager listing"));
    } else {
        report.push(Check::fail(
            "driver manager listing",
            &format!("odbcinst does not list '{}'", recipe.driver.name),
        ));
    }

    // Loader path must equal the directory component of the Driver= path.
    println!("Probing loader path...");
    let expected_dir = recipe.driver.library_dir()?.display().to_string();
    let print_loader = format!("printf '%s' \"${}\"", LOADER_PATH_VAR);
    let loader = engine::run_in_image(engine, tag, &["sh", "-c", print_loader.as_str()])?;
    if loader.success() && loader.stdout_trimmed() == expected_dir {
        report.push(Check::pass_with(LOADER_PATH_VAR, &expected_dir));
    } else {
        report.push(Check::fail(
            LOADER_PATH_VAR,
            &format!(
                "expected '{}', image has '{}'",
                expected_dir,
                loader.stdout_trimmed()
            ),
        ));
    }

    // Image metadata: declared port and default command.
    println!("Probing image metadata...");
    let inspect = engine::inspect_image(engine, tag)?;

    let ports = exposed_ports(&inspect);
    if ports.contains(&recipe.app.launch.port) {
        report.push(Check::pass_with(
            "declared port",
            &recipe.app.launch.port.to_string(),
        ));
    } else {
        report.push(Check::fail(
            "declared port",
            &format!(
                "expected {} in image metadata, found {:?}",
                recipe.app.launch.port, ports
            ),
        ));
    }

    let cmd = image_cmd(&inspect);
    if cmd == recipe.app.launch.argv() {
        report.push(Check::pass("launch command"));
    } else {
        report.push(Check::fail(
            "launch command",
            &format!(
                "expected {:?}, image records {:?}",
                recipe.app.launch.argv(),
                cmd
            ),
        ));
    }

    println!();
    Ok(report)
}

/// Verify and fail on any failed probe.
pub fn verify_image_or_fail(engine: Engine, recipe: &Recipe, tag: &str) -> Result<()> {
    let report = verify_image(engine, recipe, tag)?;
    report.print();
    if !report.all_passed() {
        bail!(
            "Image verification failed: {} probe(s) failed.",
            report.fail_count()
        );
    }
    println!("Image verified.\n");
    Ok(())
}

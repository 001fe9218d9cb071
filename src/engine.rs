//! Container engine integration.
//!
//! kiln drives whichever OCI engine is on the host. Docker is preferred
//! when both are installed; `KILN_ENGINE` forces one.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

use crate::process::{program_exists, Cmd};

/// Supported container engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Docker,
    Podman,
}

impl Engine {
    pub fn program(&self) -> &'static str {
        match self {
            Engine::Docker => "docker",
            Engine::Podman => "podman",
        }
    }

    /// Parse an explicit engine name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "docker" => Ok(Engine::Docker),
            "podman" => Ok(Engine::Podman),
            other => bail!(
                "Unknown engine '{}'. Supported: docker, podman, auto.",
                other
            ),
        }
    }

    /// Find an installed engine, docker first.
    pub fn detect() -> Result<Self> {
        for engine in [Engine::Docker, Engine::Podman] {
            if program_exists(engine.program()) {
                return Ok(engine);
            }
        }
        bail!(
            "No container engine found.\n\n\
             Looked for: docker, podman\n\n\
             Solutions:\n\
             - Install docker or podman\n\
             - Set KILN_ENGINE if the engine is installed under another name"
        );
    }

    /// Resolve a configured engine choice (`auto` detects).
    pub fn resolve(choice: &str) -> Result<Self> {
        if choice == "auto" {
            return Self::detect();
        }
        let engine = Self::from_name(choice)?;
        if !program_exists(engine.program()) {
            bail!(
                "Configured engine '{}' is not installed (KILN_ENGINE={}).",
                engine.program(),
                choice
            );
        }
        Ok(engine)
    }
}

/// Build an image from a rendered Containerfile.
///
/// Streams engine output; any engine error (base pull, package install,
/// manifest install, source copy) aborts with no retry.
pub fn build_image(
    engine: Engine,
    containerfile: &Path,
    context: &Path,
    tag: &str,
) -> Result<()> {
    Cmd::new(engine.program())
        .arg("build")
        .arg("-f")
        .arg_path(containerfile)
        .arg("-t")
        .arg(tag)
        .arg_path(context)
        .error_msg(format!("{} build failed", engine.program()))
        .run_interactive()?;
    Ok(())
}

/// Run a command inside the image, replacing the default command.
/// Used by verification probes; output is captured, not streamed.
pub fn run_in_image(engine: Engine, tag: &str, argv: &[&str]) -> Result<crate::process::CommandResult> {
    Cmd::new(engine.program())
        .args(["run", "--rm"])
        .arg(tag)
        .args(argv.iter().copied())
        .allow_fail()
        .run()
}

/// Start a detached container with the image's default command, publishing
/// one TCP port. Returns the container id.
pub fn start_detached(engine: Engine, tag: &str, port: u16) -> Result<String> {
    let result = Cmd::new(engine.program())
        .args(["run", "--rm", "-d", "-p"])
        .arg(format!("{}:{}", port, port))
        .arg(tag)
        .error_msg(format!("{} run failed", engine.program()))
        .run()?;
    let id = result.stdout_trimmed().to_string();
    if id.is_empty() {
        bail!("{} run returned no container id", engine.program());
    }
    Ok(id)
}

/// Stop a container. Best effort.
pub fn stop(engine: Engine, container: &str) {
    let result = Cmd::new(engine.program())
        .args(["stop", container])
        .allow_fail()
        .run();
    if let Ok(result) = result {
        if !result.success() {
            eprintln!(
                "  [WARN] Failed to stop container {}: {}",
                container,
                result.stderr_trimmed()
            );
        }
    }
}

/// True if the image exists locally.
pub fn image_exists(engine: Engine, tag: &str) -> bool {
    Cmd::new(engine.program())
        .args(["image", "inspect", tag])
        .allow_fail()
        .run()
        .map(|r| r.success())
        .unwrap_or(false)
}

/// Inspect an image and return its configuration object.
///
/// Both engines print a JSON array with one element per image.
pub fn inspect_image(engine: Engine, tag: &str) -> Result<Value> {
    let result = Cmd::new(engine.program())
        .args(["image", "inspect", tag])
        .error_msg(format!("{} image inspect failed for '{}'", engine.program(), tag))
        .run()?;

    let parsed: Value = serde_json::from_str(result.stdout_trimmed())
        .context("Failed to parse image inspect output")?;

    parsed
        .as_array()
        .and_then(|items| items.first())
        .cloned()
        .context("Image inspect output held no image")
}

//! Smoke command - boots the image with its default command and issues an
//! HTTP request against the declared port.
//!
//! This is the end-to-end check the build-time assertions cannot give:
//! that the recorded `module:object` import target actually starts under
//! the production server and answers on the declared port.

use anyhow::{bail, Result};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::engine::{self, Engine};
use crate::process::{program_exists, Cmd};
use crate::recipe::Recipe;

/// Execute the smoke command.
pub fn cmd_smoke(config: &Config, timeout_secs: u64) -> Result<()> {
    let recipe = Recipe::load_or_default(&config.recipe_path)?;
    let engine = Engine::resolve(&config.engine)?;
    let tag = config.tag_for(&recipe);
    let port = recipe.app.launch.port;

    if !engine::image_exists(engine, &tag) {
        bail!("Image '{}' not found. Run 'kiln build' first.", tag);
    }
    if !program_exists("curl") {
        bail!("curl is required for the smoke check but is not installed.");
    }

    println!("Starting {} (port {})...", tag, port);
    let container = engine::start_detached(engine, &tag, port)?;

    let outcome = wait_for_http(port, timeout_secs);

    println!("Stopping container...");
    engine::stop(engine, &container);

    match outcome {
        Ok(elapsed) => {
            println!(
                "Smoke check passed: application answered on port {} after {}s.",
                port,
                elapsed.as_secs()
            );
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Poll the declared port until the application answers or the timeout
/// elapses.
fn wait_for_http(port: u16, timeout_secs: u64) -> Result<Duration> {
    let url = format!("http://127.0.0.1:{}/", port);
    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let start = Instant::now();

    loop {
        let result = Cmd::new("curl")
            .args(["-fsS", "--max-time", "5"])
            .arg(&url)
            .allow_fail()
            .run()?;
        if result.success() {
            return Ok(start.elapsed());
        }
        if Instant::now() >= deadline {
            bail!(
                "No HTTP response on {} within {}s.\n\
                 The application object may fail to import; check the container logs.",
                url,
                timeout_secs
            );
        }
        thread::sleep(Duration::from_secs(1));
    }
}

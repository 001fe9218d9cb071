//! Driver registration: probe the installed library, write the registry
//! stanza, bind the loader search path.
//!
//! The driver loader resolves the library at connection time, not process
//! start, so a dangling registration would otherwise surface as an opaque
//! "driver not found" in production. The probe turns that into a build
//! failure in the same layer that writes the record.

use anyhow::Result;

use super::{FailureMode, Instruction};
use crate::recipe::{Recipe, LOADER_PATH_VAR, REGISTRY_PATH};

/// Register the driver and bind the loader path.
pub fn emit_registration(recipe: &Recipe) -> Result<Vec<Instruction>> {
    let driver = &recipe.driver;
    let library = driver.library.display().to_string();
    let library_dir = driver.library_dir()?.display().to_string();

    // printf keeps the stanza byte-exact; echo -e is not portable across
    // the base images' /bin/sh.
    let stanza_lines = format!(
        "printf '[%s]\\nDescription=%s\\nDriver=%s\\n' '{}' '{}' '{}' >> {}",
        driver.name, driver.description, library, REGISTRY_PATH
    );

    Ok(vec![
        Instruction::Run {
            shell: format!("test -f {} && {}", library, stanza_lines),
            mode: FailureMode::Fatal,
        },
        Instruction::Env {
            key: LOADER_PATH_VAR.to_string(),
            value: library_dir,
        },
    ])
}

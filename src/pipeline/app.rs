//! Application layer: workdir, manifest, dependencies, source, port,
//! launch command.
//!
//! The manifest is copied and installed before the source tree so that
//! source edits leave the dependency layer cached. The ordering lives in
//! the pipeline facts; these emitters only produce the individual steps.

use anyhow::Result;

use super::{FailureMode, Instruction};
use crate::recipe::Recipe;

/// Establish the working directory.
pub fn emit_workdir(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Workdir {
        path: recipe.app.workdir.clone(),
    }])
}

/// Copy the dependency manifest on its own, ahead of the source tree.
pub fn emit_manifest(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Copy {
        src: recipe.app.manifest.clone(),
        dest: "./".to_string(),
    }])
}

/// Install language-level dependencies from the manifest.
///
/// An unresolvable constraint fails here, before any source is copied, so
/// no image is produced from a broken manifest.
pub fn emit_dependencies(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Run {
        shell: format!(
            "pip install --no-cache-dir -r {}",
            recipe.app.manifest
        ),
        mode: FailureMode::Fatal,
    }])
}

/// Copy the remaining application source tree.
pub fn emit_source(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Copy {
        src: recipe.app.source.clone(),
        dest: ".".to_string(),
    }])
}

/// Declare the listening port as image metadata.
pub fn emit_port(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Expose {
        port: recipe.app.launch.port,
    }])
}

/// Record the default launch command. Advisory metadata only; operators may
/// override it at run time.
pub fn emit_entrypoint(recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Cmd {
        argv: recipe.app.launch.argv(),
    }])
}

//! Base layer selection.

use anyhow::{bail, Result};

use super::Instruction;
use crate::recipe::Recipe;

/// Select the pinned base runtime image.
///
/// The recipe validator already rejects floating tags; this re-checks the
/// invariant so a stage list assembled without validation still cannot
/// render an unpinned reference.
pub fn emit_base(recipe: &Recipe) -> Result<Vec<Instruction>> {
    if recipe.base.version == "latest" || recipe.base.version.trim().is_empty() {
        bail!(
            "base image is not pinned: '{}'",
            recipe.base.reference()
        );
    }

    Ok(vec![Instruction::From {
        reference: recipe.base.reference(),
    }])
}

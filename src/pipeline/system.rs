//! System dependency installation: package index, baseline packages, vendor
//! signing key, vendor repository, native driver, cache cleanup.
//!
//! Every step here is fatal except the final cleanup, which is an image-size
//! optimization and renders with a guard so its failure cannot abort the
//! build.

use anyhow::{bail, Context, Result};

use super::{FailureMode, Instruction};
use crate::recipe::Recipe;

/// Temporary location the armored key is fetched to before verification.
const KEY_FETCH_PATH: &str = "/tmp/vendor-signing-key.asc";

/// Refresh the package index against the distribution repository.
pub fn emit_package_index(_recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Run {
        shell: "apt-get update".to_string(),
        mode: FailureMode::Fatal,
    }])
}

/// Install the baseline packages the native driver depends on.
pub fn emit_baseline_packages(recipe: &Recipe) -> Result<Vec<Instruction>> {
    if recipe.system.packages.is_empty() {
        bail!("no baseline packages listed");
    }
    Ok(vec![Instruction::Run {
        shell: format!(
            "apt-get install -y --no-install-recommends {}",
            recipe.system.packages.join(" ")
        ),
        mode: FailureMode::Fatal,
    }])
}

/// Fetch the vendor signing key and add it to the trust store.
///
/// With a pinned digest in the recipe the key is checked before it is
/// dearmored; a mismatch fails the fetch layer and nothing enters the trust
/// store. Without a pin the key is trusted on first use, and the rendered
/// output says so next to the step.
pub fn emit_vendor_key(recipe: &Recipe) -> Result<Vec<Instruction>> {
    let vendor = &recipe.system.vendor;
    let keyring = vendor.keyring_path();

    let mut steps = vec![format!(
        "curl -fsSL {} -o {}",
        vendor.key_url, KEY_FETCH_PATH
    )];

    let mut instructions = Vec::new();
    match &vendor.key_sha256 {
        Some(pin) => {
            steps.push(format!(
                "echo '{}  {}' | sha256sum -c -",
                pin, KEY_FETCH_PATH
            ));
        }
        None => {
            instructions.push(Instruction::Comment(
                "no key digest pinned: the signing key is trusted as fetched".to_string(),
            ));
        }
    }

    steps.push(format!(
        "gpg --dearmor -o {} {}",
        keyring, KEY_FETCH_PATH
    ));
    steps.push(format!("rm -f {}", KEY_FETCH_PATH));

    instructions.push(Instruction::Run {
        shell: steps.join(" && "),
        mode: FailureMode::Fatal,
    });
    Ok(instructions)
}

/// Register the vendor package list for the OS release of the base image.
///
/// The release is derived from the base variant, so the repository can only
/// be registered for the OS that is actually underneath it.
pub fn emit_vendor_repo(recipe: &Recipe) -> Result<Vec<Instruction>> {
    let codename = recipe.base.codename();
    let release = recipe.base.release().with_context(|| {
        format!(
            "cannot register vendor repository: unknown OS release for variant '{}'",
            recipe.base.variant
        )
    })?;
    let vendor = &recipe.system.vendor;

    Ok(vec![Instruction::Run {
        shell: format!(
            "echo '{}' > {}",
            vendor.source_line(codename, release),
            vendor.sources_path()
        ),
        mode: FailureMode::Fatal,
    }])
}

/// Refresh the index again so the vendor repository becomes visible.
pub fn emit_vendor_index(_recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Run {
        shell: "apt-get update".to_string(),
        mode: FailureMode::Fatal,
    }])
}

/// Install the native driver package with programmatic license acceptance.
pub fn emit_native_driver(recipe: &Recipe) -> Result<Vec<Instruction>> {
    let vendor = &recipe.system.vendor;
    if !vendor.accept_eula {
        bail!(
            "refusing to render an install of '{}' without license acceptance; \
             the vendor installer blocks on an interactive prompt",
            vendor.package
        );
    }
    Ok(vec![Instruction::Run {
        shell: format!(
            "ACCEPT_EULA=Y apt-get install -y --no-install-recommends {}",
            vendor.package
        ),
        mode: FailureMode::Fatal,
    }])
}

/// Drop package caches and index metadata to shrink the image.
///
/// Best effort: omission or failure must not fail the build.
pub fn emit_cleanup(_recipe: &Recipe) -> Result<Vec<Instruction>> {
    Ok(vec![Instruction::Run {
        shell: "apt-get clean && rm -rf /var/lib/apt/lists/*".to_string(),
        mode: FailureMode::BestEffort,
    }])
}

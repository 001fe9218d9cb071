//! Declarative provisioning pipeline.
//!
//! The image build is described as an ordered list of stages. Each stage is
//! static data: a name, a phase, the facts it requires, the facts it
//! establishes, and an emit function that turns the recipe into rendered
//! instructions. The renderer interprets that data; nothing else writes
//! Containerfile text.
//!
//! ```text
//! Stage (DATA)                          ->   Renderer (LOGIC)
//! ------------------------------------       -----------------
//! Stage {                                    for stage in PIPELINE {
//!   name: "vendor-repo",                       for ins in (stage.emit)(recipe)? {
//!   requires: &[Fact::VendorKeyTrusted],         write(ins)
//!   provides: &[Fact::VendorRepoRegistered],   }
//!   ..                                       }
//! }
//! ```
//!
//! The ordering rules the original hand-written recipe kept in comments
//! (key before repository, repository before index refresh, manifest before
//! source) are facts here, and `lint()` verifies them mechanically.

pub mod app;
pub mod base;
pub mod driver;
pub mod render;
pub mod system;

use anyhow::{bail, Result};
use std::fmt;

use crate::recipe::Recipe;

/// Build phases determine stage grouping and coarse ordering.
///
/// Phases mirror the four components of the pipeline: pick the base layer,
/// install system dependencies, register the driver, assemble the
/// application layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Pinned base runtime image.
    Base = 1,
    /// OS packages, vendor key/repository, native driver.
    System = 2,
    /// Driver registration record and loader path.
    Driver = 3,
    /// Manifest, dependencies, source, port, launch command.
    App = 4,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Base => write!(f, "base"),
            Phase::System => write!(f, "system"),
            Phase::Driver => write!(f, "driver"),
            Phase::App => write!(f, "app"),
        }
    }
}

/// A piece of established build state.
///
/// Stages declare the facts they consume and produce; the linter walks the
/// pipeline and rejects any stage whose requirements are not met by an
/// earlier stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    /// Base filesystem snapshot with runtime and package manager.
    BaseFilesystem,
    /// Package index refreshed against the distribution repository.
    PackageIndex,
    /// Compilers and TLS/auth libraries installed.
    Toolchain,
    /// Generic ODBC runtime and headers installed.
    OdbcRuntime,
    /// Vendor signing key fetched, verified, and in the trust store.
    VendorKeyTrusted,
    /// Vendor package list registered for the base image's OS release.
    VendorRepoRegistered,
    /// Package index refreshed with the vendor repository visible.
    VendorIndex,
    /// Native driver package installed and its library present on disk.
    NativeDriver,
    /// Registration stanza written to the driver registry.
    DriverRegistered,
    /// Loader search path bound for all derived containers.
    LoaderPath,
    /// Working directory established.
    Workdir,
    /// Dependency manifest copied into the image.
    Manifest,
    /// Language-level dependencies installed from the manifest.
    AppDependencies,
    /// Application source tree copied.
    SourceTree,
    /// Listening port declared as image metadata.
    PortDeclared,
    /// Default launch command recorded.
    Entrypoint,
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Fact::BaseFilesystem => "base filesystem",
            Fact::PackageIndex => "package index",
            Fact::Toolchain => "toolchain",
            Fact::OdbcRuntime => "odbc runtime",
            Fact::VendorKeyTrusted => "vendor key trusted",
            Fact::VendorRepoRegistered => "vendor repo registered",
            Fact::VendorIndex => "vendor index",
            Fact::NativeDriver => "native driver",
            Fact::DriverRegistered => "driver registered",
            Fact::LoaderPath => "loader path",
            Fact::Workdir => "workdir",
            Fact::Manifest => "manifest",
            Fact::AppDependencies => "app dependencies",
            Fact::SourceTree => "source tree",
            Fact::PortDeclared => "port declared",
            Fact::Entrypoint => "entrypoint",
        };
        write!(f, "{}", name)
    }
}

/// Whether a failing instruction aborts the image build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Any error aborts the whole build. No retry, no fallback.
    Fatal,
    /// Failure is tolerated; the step is an optimization, not a
    /// correctness requirement.
    BestEffort,
}

/// One rendered build instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Base image selection.
    From { reference: String },
    /// Free-form comment carried into the rendered output.
    Comment(String),
    /// Shell step executed in a fresh layer.
    Run { shell: String, mode: FailureMode },
    /// Environment variable inherited by every derived container.
    Env { key: String, value: String },
    /// Working directory for subsequent steps and the running container.
    Workdir { path: String },
    /// Copy from the build context into the image.
    Copy { src: String, dest: String },
    /// TCP port advertised as image metadata.
    Expose { port: u16 },
    /// Default launch command, exec form.
    Cmd { argv: Vec<String> },
}

/// One named step of the pipeline.
#[derive(Debug)]
pub struct Stage {
    /// Stable name, used in rendered output and lint messages.
    pub name: &'static str,
    pub phase: Phase,
    /// Facts that must be established by earlier stages.
    pub requires: &'static [Fact],
    /// Facts this stage establishes.
    pub provides: &'static [Fact],
    /// Produce this stage's instructions from the recipe.
    pub emit: fn(&Recipe) -> Result<Vec<Instruction>>,
}

/// The provisioning pipeline, in execution order.
///
/// Order within a phase matters and is protected by facts, not position:
/// reordering entries here fails `lint()` rather than silently building a
/// broken image.
pub static PIPELINE: &[Stage] = &[
    Stage {
        name: "base",
        phase: Phase::Base,
        requires: &[],
        provides: &[Fact::BaseFilesystem],
        emit: base::emit_base,
    },
    Stage {
        name: "package-index",
        phase: Phase::System,
        requires: &[Fact::BaseFilesystem],
        provides: &[Fact::PackageIndex],
        emit: system::emit_package_index,
    },
    Stage {
        name: "baseline-packages",
        phase: Phase::System,
        requires: &[Fact::PackageIndex],
        provides: &[Fact::Toolchain, Fact::OdbcRuntime],
        emit: system::emit_baseline_packages,
    },
    Stage {
        name: "vendor-key",
        phase: Phase::System,
        requires: &[Fact::Toolchain],
        provides: &[Fact::VendorKeyTrusted],
        emit: system::emit_vendor_key,
    },
    Stage {
        name: "vendor-repo",
        phase: Phase::System,
        requires: &[Fact::VendorKeyTrusted],
        provides: &[Fact::VendorRepoRegistered],
        emit: system::emit_vendor_repo,
    },
    Stage {
        name: "vendor-index",
        phase: Phase::System,
        requires: &[Fact::VendorRepoRegistered],
        provides: &[Fact::VendorIndex],
        emit: system::emit_vendor_index,
    },
    Stage {
        name: "native-driver",
        phase: Phase::System,
        requires: &[Fact::VendorIndex, Fact::OdbcRuntime],
        provides: &[Fact::NativeDriver],
        emit: system::emit_native_driver,
    },
    Stage {
        name: "apt-cleanup",
        phase: Phase::System,
        requires: &[Fact::NativeDriver],
        provides: &[],
        emit: system::emit_cleanup,
    },
    Stage {
        name: "driver-registration",
        phase: Phase::Driver,
        requires: &[Fact::NativeDriver],
        provides: &[Fact::DriverRegistered, Fact::LoaderPath],
        emit: driver::emit_registration,
    },
    Stage {
        name: "workdir",
        phase: Phase::App,
        requires: &[Fact::BaseFilesystem],
        provides: &[Fact::Workdir],
        emit: app::emit_workdir,
    },
    Stage {
        name: "manifest",
        phase: Phase::App,
        requires: &[Fact::Workdir],
        provides: &[Fact::Manifest],
        emit: app::emit_manifest,
    },
    Stage {
        name: "app-dependencies",
        phase: Phase::App,
        requires: &[Fact::Manifest, Fact::Toolchain],
        provides: &[Fact::AppDependencies],
        emit: app::emit_dependencies,
    },
    Stage {
        name: "source",
        phase: Phase::App,
        requires: &[Fact::Workdir, Fact::AppDependencies],
        provides: &[Fact::SourceTree],
        emit: app::emit_source,
    },
    Stage {
        name: "port",
        phase: Phase::App,
        requires: &[Fact::SourceTree],
        provides: &[Fact::PortDeclared],
        emit: app::emit_port,
    },
    Stage {
        name: "entrypoint",
        phase: Phase::App,
        requires: &[Fact::SourceTree, Fact::PortDeclared, Fact::AppDependencies],
        provides: &[Fact::Entrypoint],
        emit: app::emit_entrypoint,
    },
];

/// One ordering or structure violation found by the linter.
#[derive(Debug, Clone)]
pub struct LintError {
    /// Name of the offending stage.
    pub stage: String,
    pub message: String,
}

impl fmt::Display for LintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage '{}': {}", self.stage, self.message)
    }
}

/// Check a stage list for ordering and structure violations.
///
/// Verified properties:
/// - every required fact is provided by an earlier stage
/// - phases never decrease
/// - stage names are unique
/// - no fact is provided twice
pub fn lint(stages: &[Stage]) -> Vec<LintError> {
    let mut errors = Vec::new();
    let mut established: Vec<Fact> = Vec::new();
    let mut seen_names: Vec<&str> = Vec::new();
    let mut prev_phase: Option<Phase> = None;

    for stage in stages {
        if seen_names.contains(&stage.name) {
            errors.push(LintError {
                stage: stage.name.to_string(),
                message: "duplicate stage name".to_string(),
            });
        }
        seen_names.push(stage.name);

        if let Some(prev) = prev_phase {
            if stage.phase < prev {
                errors.push(LintError {
                    stage: stage.name.to_string(),
                    message: format!(
                        "phase '{}' comes after a stage in later phase '{}'",
                        stage.phase, prev
                    ),
                });
            }
        }
        prev_phase = Some(stage.phase.max(prev_phase.unwrap_or(stage.phase)));

        for fact in stage.requires {
            if !established.contains(fact) {
                errors.push(LintError {
                    stage: stage.name.to_string(),
                    message: format!("requires '{}' which no earlier stage provides", fact),
                });
            }
        }

        for fact in stage.provides {
            if established.contains(fact) {
                errors.push(LintError {
                    stage: stage.name.to_string(),
                    message: format!("provides '{}' which is already established", fact),
                });
            } else {
                established.push(*fact);
            }
        }
    }

    errors
}

/// Lint and fail with a combined message on any violation.
pub fn lint_or_fail(stages: &[Stage]) -> Result<()> {
    let errors = lint(stages);
    if errors.is_empty() {
        return Ok(());
    }
    bail!(
        "Pipeline lint failed ({} error{}):\n{}",
        errors.len(),
        if errors.len() == 1 { "" } else { "s" },
        errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

/// Emit every stage's instructions in pipeline order.
pub fn emit_all<'a>(
    stages: &'a [Stage],
    recipe: &Recipe,
) -> Result<Vec<(&'a Stage, Vec<Instruction>)>> {
    let mut out = Vec::with_capacity(stages.len());
    for stage in stages {
        let instructions = (stage.emit)(recipe)
            .map_err(|e| e.context(format!("in stage '{}'", stage.name)))?;
        out.push((stage, instructions));
    }
    Ok(out)
}

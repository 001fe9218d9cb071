//! Layer staleness tracking - content digests, not mtimes.
//!
//! The engine caches layers by instruction and copied content; kiln keeps
//! its own SHA-256 digests of the three inputs that govern layer validity
//! (recipe, dependency manifest, source tree) so `show status` can say
//! which layers a rebuild would invalidate without running the engine.
//!
//! Digests are recorded only after a successful build.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// SHA-256 of one file's contents. None if the file is missing or
/// unreadable; an unreadable input invalidates whatever depended on it.
pub fn digest_file(path: &Path) -> Option<String> {
    if !path.is_file() {
        return None;
    }
    match fs::read(path) {
        Ok(content) => {
            let mut hasher = Sha256::new();
            hasher.update(&content);
            Some(format!("{:x}", hasher.finalize()))
        }
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to read {} for digest: {} (layer treated as stale)",
                path.display(),
                e
            );
            None
        }
    }
}

/// SHA-256 over a source tree: relative paths and contents, in sorted
/// order, so the digest is stable across filesystems. Entries under any
/// of `exclude` are skipped, as are VCS directories.
pub fn digest_tree(root: &Path, exclude: &[&Path]) -> Result<String> {
    let mut hasher = Sha256::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let path = entry.path();
            if exclude.iter().any(|ex| path == *ex) {
                return false;
            }
            entry.file_name() != ".git"
        });

    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or_else(|_| entry.path());
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let content = fs::read(entry.path())
            .with_context(|| format!("Failed to read {}", entry.path().display()))?;
        hasher.update(&content);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Read a recorded digest. None if never recorded.
pub fn read_recorded(record: &Path) -> Option<String> {
    if !record.exists() {
        return None;
    }
    match fs::read_to_string(record) {
        Ok(s) => Some(s.trim().to_string()),
        Err(e) => {
            eprintln!(
                "  [WARN] Failed to read digest record {}: {} (layer treated as stale)",
                record.display(),
                e
            );
            None
        }
    }
}

/// Record a digest after a successful build.
pub fn record(record: &Path, digest: &str) -> Result<()> {
    if let Some(parent) = record.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(record, digest)?;
    Ok(())
}

/// A layer is stale when its input digest is unknown or has changed.
pub fn is_stale(current: Option<&str>, record: &Path) -> bool {
    match (current, read_recorded(record)) {
        (Some(current), Some(recorded)) => current != recorded,
        _ => true,
    }
}

/// Staleness of one tracked layer, for status reporting.
#[derive(Debug, Clone)]
pub struct LayerStatus {
    pub name: &'static str,
    pub stale: bool,
}

/// Digest record file names under the output directory.
pub const RECIPE_RECORD: &str = ".recipe.digest";
pub const MANIFEST_RECORD: &str = ".manifest.digest";
pub const SOURCE_RECORD: &str = ".source.digest";

/// Record file path under an output directory.
pub fn record_path(output: &Path, name: &str) -> PathBuf {
    output.join(name)
}

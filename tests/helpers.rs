//! Shared test utilities for kiln tests.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use kiln::config::Config;

/// Test environment with a temporary build context.
pub struct TestEnv {
    /// Temporary directory (kept alive for the lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Build context directory
    pub context: PathBuf,
    /// Output directory inside the context
    pub output: PathBuf,
}

impl TestEnv {
    /// Create an empty build context.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let context = temp_dir.path().join("context");
        let output = context.join("output");
        fs::create_dir_all(&context).expect("Failed to create context dir");

        Self {
            _temp_dir: temp_dir,
            context,
            output,
        }
    }

    /// Create a build context that looks like the reference service:
    /// a manifest with pinned specs and a module holding the app object.
    pub fn with_service() -> Self {
        let env = Self::new();
        env.write(
            "requirements.txt",
            "fastapi==0.110.0\nuvicorn==0.29.0\ngunicorn==21.2.0\naioodbc==0.5.0\n",
        );
        env.write("main.py", "app = object()\n");
        env
    }

    /// Write a file into the build context.
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.context.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        fs::write(&path, content).expect("Failed to write test file");
    }

    /// Write a recipe file and return its path.
    pub fn write_recipe(&self, json: &str) -> PathBuf {
        let path = self.context.join("recipe.json");
        fs::write(&path, json).expect("Failed to write recipe");
        path
    }

    /// A configuration pointing at this context, independent of the
    /// process environment.
    pub fn config(&self) -> Config {
        Config {
            engine: "auto".to_string(),
            recipe_path: self.context.join("recipe.json"),
            context: self.context.clone(),
            output: self.output.clone(),
            tag: None,
        }
    }
}

/// Assert that `needle` occurs in `haystack` before `later_needle`.
pub fn assert_ordered(haystack: &str, needle: &str, later_needle: &str) {
    let first = haystack
        .find(needle)
        .unwrap_or_else(|| panic!("'{}' not found in:\n{}", needle, haystack));
    let second = haystack
        .find(later_needle)
        .unwrap_or_else(|| panic!("'{}' not found in:\n{}", later_needle, haystack));
    assert!(
        first < second,
        "'{}' must come before '{}' in:\n{}",
        needle,
        later_needle,
        haystack
    );
}

/// Convenience: the path of a file that must exist.
pub fn assert_file_exists(path: &Path) {
    assert!(path.is_file(), "expected file at {}", path.display());
}

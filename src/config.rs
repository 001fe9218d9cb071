//! Runtime configuration.
//!
//! Read from the process environment; `main` loads a `.env` file first, so
//! both `.env` entries and real environment variables work, with real
//! variables taking precedence (dotenvy never overrides existing ones).

use std::path::{Path, PathBuf};

use crate::recipe::Recipe;

/// kiln configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container engine: `docker`, `podman`, or `auto` (default: auto).
    pub engine: String,
    /// Recipe file path (default: `<context>/recipe.json`).
    pub recipe_path: PathBuf,
    /// Build context directory (default: current directory).
    pub context: PathBuf,
    /// Output directory for the rendered Containerfile and digest records
    /// (default: `<context>/output`).
    pub output: PathBuf,
    /// Image tag override; defaults to `<recipe name>:dev`.
    pub tag: Option<String>,
}

impl Config {
    /// Load configuration, resolving relative paths against `base_dir`.
    pub fn load(base_dir: &Path) -> Self {
        let get = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        let resolve = |value: String| {
            let path = PathBuf::from(value);
            if path.is_absolute() {
                path
            } else {
                base_dir.join(path)
            }
        };

        let engine = get("KILN_ENGINE").unwrap_or_else(|| "auto".to_string());

        let context = get("KILN_CONTEXT")
            .map(resolve)
            .unwrap_or_else(|| base_dir.to_path_buf());

        let recipe_path = get("KILN_RECIPE")
            .map(resolve)
            .unwrap_or_else(|| context.join("recipe.json"));

        let output = get("KILN_OUTPUT")
            .map(resolve)
            .unwrap_or_else(|| context.join("output"));

        let tag = get("KILN_TAG");

        Self {
            engine,
            recipe_path,
            context,
            output,
            tag,
        }
    }

    /// Tag for the built image.
    pub fn tag_for(&self, recipe: &Recipe) -> String {
        self.tag
            .clone()
            .unwrap_or_else(|| format!("{}:dev", recipe.name))
    }

    /// Path the rendered Containerfile is written to.
    pub fn containerfile(&self) -> PathBuf {
        self.output.join("Containerfile")
    }

    /// Print configuration for `show config`.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  KILN_ENGINE:  {}", self.engine);
        println!("  KILN_RECIPE:  {}", self.recipe_path.display());
        println!("  KILN_CONTEXT: {}", self.context.display());
        println!("  KILN_OUTPUT:  {}", self.output.display());
        match &self.tag {
            Some(tag) => println!("  KILN_TAG:     {}", tag),
            None => println!("  KILN_TAG:     (default: <recipe name>:dev)"),
        }
        if self.recipe_path.exists() {
            println!("  Recipe file: FOUND");
        } else {
            println!("  Recipe file: NOT FOUND (built-in default recipe will be used)");
        }
    }
}

//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Render the pipeline and build the image
//! - `render` - Render the Containerfile only
//! - `lint` - Validate the recipe and pipeline ordering
//! - `verify` - Probe a built image against the recipe
//! - `smoke` - Boot the image and hit the declared port
//! - `preflight` - Run preflight checks
//! - `show` - Display information
//! - `clean` - Remove rendered output and digest records

pub mod build;
pub mod clean;
pub mod lint;
mod preflight;
pub mod render;
pub mod show;
pub mod smoke;
pub mod verify;

pub use build::cmd_build;
pub use clean::cmd_clean;
pub use lint::cmd_lint;
pub use preflight::cmd_preflight;
pub use render::cmd_render;
pub use show::cmd_show;
pub use smoke::cmd_smoke;
pub use verify::cmd_verify;

//! kiln - container image provisioning pipeline.
//!
//! Renders a declarative image recipe (pinned Python base, vendor ODBC
//! driver behind a verified signing key, driver registration, cached
//! dependency layer, recorded launch command) to a Containerfile, builds it
//! with docker or podman, and verifies the produced image.

use anyhow::Result;
use clap::{Parser, Subcommand};

use kiln::commands;
use kiln::config::Config;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(about = "Container image provisioning pipeline")]
#[command(
    after_help = "QUICK START:\n  kiln preflight  Check host tools and build inputs\n  kiln build      Render the pipeline and build the image\n  kiln verify     Probe the built image against the recipe\n  kiln smoke      Boot the image and hit the declared port"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the pipeline and build the image (verifies afterwards)
    Build {
        /// Skip post-build verification probes
        #[arg(long)]
        skip_verify: bool,
    },

    /// Render the Containerfile without building
    Render {
        /// Print to stdout instead of writing the output file
        #[arg(long)]
        stdout: bool,
    },

    /// Validate the recipe and the pipeline ordering
    Lint,

    /// Probe a built image against the recipe
    Verify {
        /// Image tag to verify (default: <recipe name>:dev or KILN_TAG)
        #[arg(long)]
        tag: Option<String>,
    },

    /// Boot the image with its default command and hit the declared port
    Smoke {
        /// Seconds to wait for an HTTP response
        #[arg(short, long, default_value = "60")]
        timeout: u64,
    },

    /// Run preflight checks (verify host tools and build inputs)
    Preflight {
        /// Treat warnings as failures
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Remove rendered output and digest records
    Clean,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the effective recipe (defaults included)
    Recipe,
    /// Show layer staleness (what a rebuild would invalidate)
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_dir = std::env::current_dir()?;

    // Load .env if present; real environment variables win.
    dotenvy::dotenv().ok();
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Build { skip_verify } => {
            commands::cmd_build(&config, skip_verify)?;
        }

        Commands::Render { stdout } => {
            commands::cmd_render(&config, stdout)?;
        }

        Commands::Lint => {
            commands::cmd_lint(&config)?;
        }

        Commands::Verify { tag } => {
            commands::cmd_verify(&config, tag)?;
        }

        Commands::Smoke { timeout } => {
            commands::cmd_smoke(&config, timeout)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Recipe => commands::show::ShowTarget::Recipe,
                ShowTarget::Status => commands::show::ShowTarget::Status,
            };
            commands::cmd_show(&config, show_target)?;
        }

        Commands::Clean => {
            commands::cmd_clean(&config)?;
        }
    }

    Ok(())
}

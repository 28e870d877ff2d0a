//! minimize - minimal container images for daemon binaries.
//!
//! Resolves a daemon package and its shared-library packages, then
//! assembles a tree holding only what the daemon needs to run.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use minimize::config::Config;

#[derive(Parser)]
#[command(name = "minimize")]
#[command(about = "Minimal image builder for daemon binaries")]
#[command(
    after_help = "QUICK START:\n  minimize preflight                   Check host tools\n  minimize build dhcp-server --daemon-file dhcpd\n  minimize show config                 Print effective configuration"
)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the image tree and manifest for a daemon package
    Build {
        /// Daemon package name (e.g. dhcp-server)
        package: String,

        /// Executable inside the package (default: the only one)
        #[arg(long)]
        daemon_file: Option<String>,

        /// Where package archives are downloaded
        #[arg(long)]
        package_dir: Option<PathBuf>,

        /// Where package archives are unpacked
        #[arg(long)]
        unpack_dir: Option<PathBuf>,

        /// Where image trees and manifests are written
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Run the fetch stage
        #[arg(long)]
        fetch: bool,

        /// Run the unpack stage
        #[arg(long)]
        unpack: bool,

        /// Run library resolution
        #[arg(long)]
        resolve: bool,

        /// Assemble the image tree
        #[arg(long)]
        model: bool,

        /// Write the manifest
        #[arg(long)]
        manifest: bool,

        /// Re-extract packages even if already unpacked
        #[arg(long)]
        force_unpack: bool,

        /// Manifest destination, '-' for stdout (default: <model-dir>/<exe>.json)
        #[arg(long)]
        manifest_path: Option<PathBuf>,

        /// Per-command timeout in seconds, 0 disables
        #[arg(long)]
        timeout: Option<u64>,

        /// Don't download install-time dependencies
        #[arg(long)]
        no_deps: bool,
    },

    /// Compare two release names (prints <, = or >)
    Compare { left: String, right: String },

    /// List executables of an unpacked package
    Executables {
        package: String,

        /// Also resolve each executable's libraries and list the providing packages
        #[arg(long)]
        all: bool,
    },

    /// Check host tools and cache directories
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let base_dir = std::env::current_dir()?;
    let config = Config::load(&base_dir);

    match cli.command {
        Commands::Build {
            package,
            daemon_file,
            package_dir,
            unpack_dir,
            model_dir,
            fetch,
            unpack,
            resolve,
            model,
            manifest,
            force_unpack,
            manifest_path,
            timeout,
            no_deps,
        } => {
            let args = commands::build::BuildArgs {
                package,
                daemon_file,
                package_dir,
                unpack_dir,
                model_dir,
                stages: minimize::pipeline::Stages {
                    fetch,
                    unpack,
                    resolve,
                    model,
                    manifest,
                },
                force_unpack,
                manifest_path,
                timeout,
                no_deps,
            };
            commands::cmd_build(args, config)?;
        }

        Commands::Compare { left, right } => {
            commands::cmd_compare(&left, &right)?;
        }

        Commands::Executables { package, all } => {
            commands::cmd_executables(&package, all, &config)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&config, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
            };
            commands::cmd_show(show_target, &config)?;
        }
    }

    Ok(())
}

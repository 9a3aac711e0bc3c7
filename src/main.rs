//! capsule - minimal runtime capsules from Android system images.
//!
//! - `sync`: copy the dependency closure of the core service binaries into
//!   a capsule tree and write its manifest
//! - `cpio-edit`: edit a newc ramdisk archive without unpacking it
//! - `extract-ramdisk`: pull the ramdisk out of a boot image

mod commands;
mod timing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use capsule::config::Config;

#[derive(Parser)]
#[command(name = "capsule")]
#[command(about = "Extract minimal runtime capsules from Android system images")]
#[command(
    after_help = "QUICK START:\n  capsule sync ./system-root ./capsule ./capsule.toml\n  capsule show profile      Print the active profile"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy the runtime closure of the core binaries and write a manifest
    Sync {
        /// Root of the extracted system image
        system_root: PathBuf,
        /// Capsule directory to populate
        destination: PathBuf,
        /// Manifest output path
        manifest: PathBuf,
        /// Profile file (overrides CAPSULE_PROFILE)
        #[arg(long)]
        profile: Option<PathBuf>,
    },

    /// Edit a newc cpio archive in place of unpacking it
    CpioEdit {
        /// Input archive
        #[arg(short, long)]
        input: PathBuf,
        /// Output archive
        #[arg(short, long)]
        output: PathBuf,
        /// Rename an entry (OLD=NEW)
        #[arg(long, value_name = "OLD=NEW")]
        rename: Vec<String>,
        /// Replace an entry's contents with a host file (NAME=FILE)
        #[arg(long, value_name = "NAME=FILE")]
        replace: Vec<String>,
        /// Remove an entry
        #[arg(long, value_name = "NAME")]
        remove: Vec<String>,
        /// Add an entry from a host file (NAME=FILE)
        #[arg(long, value_name = "NAME=FILE")]
        add: Vec<String>,
    },

    /// Extract the ramdisk from an Android boot image
    ExtractRamdisk {
        /// Boot image
        boot_image: PathBuf,
        /// Ramdisk output path
        output: PathBuf,
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
    /// Show the active profile
    Profile {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
        /// Profile file (overrides CAPSULE_PROFILE)
        #[arg(long)]
        profile: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Sync {
            system_root,
            destination,
            manifest,
            profile,
        } => {
            commands::cmd_sync(
                &system_root,
                &destination,
                &manifest,
                profile.as_deref(),
                &config,
            )?;
        }

        Commands::CpioEdit {
            input,
            output,
            rename,
            replace,
            remove,
            add,
        } => {
            commands::cmd_cpio_edit(&input, &output, &rename, &replace, &remove, &add)?;
        }

        Commands::ExtractRamdisk { boot_image, output } => {
            commands::cmd_extract_ramdisk(&boot_image, &output)?;
        }

        Commands::Show { what } => match what {
            ShowTarget::Config => {
                commands::cmd_show(commands::show::ShowTarget::Config, None, &config)?;
            }
            ShowTarget::Profile { json, profile } => {
                commands::cmd_show(
                    commands::show::ShowTarget::Profile { json },
                    profile.as_deref(),
                    &config,
                )?;
            }
        },
    }

    Ok(())
}

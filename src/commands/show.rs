//! Show command - displays configuration and the active profile.

use anyhow::{Context, Result};
use std::path::Path;

use capsule::config::Config;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show the profile a sync would use
    Profile { json: bool },
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, profile: Option<&Path>, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => {
            config.print();
            match config.profile_source(profile) {
                Some(path) => println!("  Active profile: {}", path.display()),
                None => println!("  Active profile: built-in defaults"),
            }
        }
        ShowTarget::Profile { json } => {
            let profile = config.profile(profile).context("Failed to load profile")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            } else {
                print!("{}", profile.to_toml()?);
            }
        }
    }
    Ok(())
}

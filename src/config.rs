//! Runtime configuration.
//!
//! Read from the environment after `main` has loaded `.env` via `dotenvy`, so
//! real environment variables take precedence over the file.

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::profile::Profile;

/// Environment variable naming a TOML profile file.
pub const PROFILE_ENV: &str = "CAPSULE_PROFILE";
/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "CAPSULE_LOG";

const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone)]
pub struct Config {
    /// Profile named by `CAPSULE_PROFILE`, if set.
    pub profile_path: Option<PathBuf>,
    /// Filter for the diagnostic log (`CAPSULE_LOG`, then `RUST_LOG`).
    pub log_filter: String,
}

impl Config {
    pub fn load() -> Self {
        let profile_path = std::env::var_os(PROFILE_ENV)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let log_filter = std::env::var(LOG_ENV)
            .or_else(|_| std::env::var("RUST_LOG"))
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Self {
            profile_path,
            log_filter,
        }
    }

    /// Per-user profile location (`~/.config/capsule/profile.toml`).
    pub fn user_profile_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("capsule").join("profile.toml"))
    }

    /// Which profile file applies: the explicit flag, then the environment,
    /// then the per-user file if it exists. `None` means built-in defaults.
    pub fn profile_source(&self, flag: Option<&Path>) -> Option<PathBuf> {
        flag.map(Path::to_path_buf)
            .or_else(|| self.profile_path.clone())
            .or_else(|| Self::user_profile_path().filter(|p| p.is_file()))
    }

    /// Load the active profile.
    pub fn profile(&self, flag: Option<&Path>) -> Result<Profile> {
        match self.profile_source(flag) {
            Some(path) => {
                tracing::info!("using profile {}", path.display());
                Profile::load(&path)
            }
            None => Ok(Profile::android()),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        match &self.profile_path {
            Some(p) => println!("  {}: {}", PROFILE_ENV, p.display()),
            None => println!("  {}: (unset)", PROFILE_ENV),
        }
        println!("  {}: {}", LOG_ENV, self.log_filter);
        match Self::user_profile_path() {
            Some(p) if p.is_file() => println!("  User profile: {} (FOUND)", p.display()),
            Some(p) => println!("  User profile: {} (not present)", p.display()),
            None => println!("  User profile: no config directory"),
        }
    }
}

//! Sync command - builds the capsule and writes its manifest.

use anyhow::{Context, Result};
use std::path::Path;

use capsule::config::Config;
use capsule::sync_capsule;

use crate::timing::Timer;

/// Execute the sync command.
pub fn cmd_sync(
    system_root: &Path,
    destination: &Path,
    manifest: &Path,
    profile: Option<&Path>,
    config: &Config,
) -> Result<()> {
    let profile = config.profile(profile).context("Failed to load profile")?;

    let timer = Timer::start("Capsule sync");
    let report = sync_capsule(system_root, destination, manifest, &profile).with_context(|| {
        format!(
            "Failed to sync capsule from {} into {}",
            system_root.display(),
            destination.display()
        )
    })?;
    timer.finish();

    for line in report.summary_lines() {
        eprintln!("{}", line);
    }
    Ok(())
}

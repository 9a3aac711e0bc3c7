//! End-to-end capsule synchronization.
//!
//! index -> closure -> materialize -> manifest. Every check that can reject
//! the image (missing roots, unresolved libraries, missing interpreter) runs
//! before the first byte is copied. The manifest is written last, so a failed
//! run never leaves one behind.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::{CapsuleError, Result};
use crate::libindex::LibraryIndex;
use crate::manifest::{synthesize, Manifest};
use crate::materialize::materialize;
use crate::profile::Profile;
use crate::resolve::resolve_closure;

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub manifest: Manifest,
    pub optional_missing: Vec<String>,
    pub provided_externals: BTreeSet<String>,
    /// Missing optional config files and directories.
    pub warnings: Vec<String>,
}

impl SyncReport {
    /// End-of-run summary: per-type counts, then warnings, then provided
    /// externals.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "Wrote manifest for {} artifacts.",
            self.manifest.artifacts.len()
        )];
        for (role, count) in self.manifest.summary() {
            lines.push(format!("  {}: {}", role, count));
        }
        for rel in &self.optional_missing {
            lines.push(format!(
                "Warning: optional binary '{}' not found in system image.",
                rel
            ));
        }
        for message in &self.warnings {
            lines.push(format!("Warning: {}", message));
        }
        for rel in &self.provided_externals {
            lines.push(format!(
                "Info: dependency '{}' not copied (provided by base system/apex).",
                rel
            ));
        }
        lines
    }
}

/// Build the capsule for `root` into `dest` and write its manifest.
pub fn sync_capsule(root: &Path, dest: &Path, manifest_path: &Path, profile: &Profile) -> Result<SyncReport> {
    if !root.is_dir() {
        return Err(CapsuleError::io(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "system root is not a directory"),
        ));
    }

    let index = LibraryIndex::build(root, &profile.index)?;
    let closure = resolve_closure(root, profile, &index)?;

    fs::create_dir_all(dest).map_err(|e| CapsuleError::io(dest, e))?;
    let materialized = materialize(root, dest, profile, &closure)?;

    let manifest = synthesize(dest, &materialized)?;
    manifest.write(manifest_path)?;

    Ok(SyncReport {
        manifest,
        optional_missing: closure.optional_missing,
        provided_externals: closure.provided_externals,
        warnings: materialized.warnings,
    })
}

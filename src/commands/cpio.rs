//! Cpio-edit command - rewrites entries of a newc ramdisk archive.

use anyhow::{Context, Result};
use std::path::Path;

use capsule::cpio::{ArchiveEdits, CpioArchive};

/// Execute the cpio-edit command.
pub fn cmd_cpio_edit(
    input: &Path,
    output: &Path,
    rename: &[String],
    replace: &[String],
    remove: &[String],
    add: &[String],
) -> Result<()> {
    let edits = ArchiveEdits::from_args(rename, replace, remove, add)?;
    let archive = CpioArchive::open(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let edited = archive.edit(&edits)?;
    edited
        .save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    eprintln!(
        "Wrote {} entries to {}",
        edited.without_trailer().len(),
        output.display()
    );
    Ok(())
}

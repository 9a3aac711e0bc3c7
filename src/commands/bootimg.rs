//! Extract-ramdisk command.

use anyhow::{Context, Result};
use std::path::Path;

use capsule::bootimg::extract_ramdisk;

pub fn cmd_extract_ramdisk(boot_image: &Path, output: &Path) -> Result<()> {
    let size = extract_ramdisk(boot_image, output)
        .with_context(|| format!("Failed to extract ramdisk from {}", boot_image.display()))?;
    eprintln!("Extracted {} bytes to {}", size, output.display());
    Ok(())
}

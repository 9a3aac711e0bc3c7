//! Copy primitives that keep symlinks as symlinks.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use walkdir::WalkDir;

use super::paths::{ensure_parent_exists, lexists};
use crate::error::{CapsuleError, Result};

/// Recreate the symlink at `src` as `dst` with the same literal target,
/// replacing whatever is at `dst`.
pub fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).map_err(|e| CapsuleError::io(src, e))?;
    if lexists(dst) {
        fs::remove_file(dst).map_err(|e| CapsuleError::io(dst, e))?;
    }
    symlink(&target, dst).map_err(|e| CapsuleError::io(dst, e))
}

/// Copy file contents, permissions and modification time.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).map_err(|e| CapsuleError::io(src, e))?;
    let modified = fs::metadata(src)
        .and_then(|m| m.modified())
        .map_err(|e| CapsuleError::io(src, e))?;
    fs::File::open(dst)
        .and_then(|f| f.set_modified(modified))
        .map_err(|e| CapsuleError::io(dst, e))
}

/// Copy one entry from `src` to `dst`, creating parent directories.
pub fn copy_entry(src: &Path, dst: &Path) -> Result<()> {
    ensure_parent_exists(dst)?;
    let meta = fs::symlink_metadata(src).map_err(|e| CapsuleError::io(src, e))?;
    if meta.file_type().is_symlink() {
        copy_symlink(src, dst)
    } else {
        copy_file_with_metadata(src, dst)
    }
}

/// Copy a directory tree, preserving symlinks and merging into an
/// existing destination. Returns the number of non-directory entries copied.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    fs::create_dir_all(dst).map_err(|e| CapsuleError::io(dst, e))?;
    let mut count = 0;

    for entry in WalkDir::new(src).follow_links(false).sort_by_file_name() {
        let entry = entry.map_err(|e| CapsuleError::walk(src, e))?;
        let rel = match entry.path().strip_prefix(src) {
            Ok(rel) if !rel.as_os_str().is_empty() => rel,
            _ => continue,
        };
        let dest_path = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest_path).map_err(|e| CapsuleError::io(&dest_path, e))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest_path)?;
            count += 1;
        } else {
            copy_file_with_metadata(entry.path(), &dest_path)?;
            count += 1;
        }
    }

    Ok(count)
}

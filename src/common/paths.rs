//! Path helpers shared by the index, resolver and manifest.
//!
//! Capsule paths are always root-relative and `/`-separated regardless of
//! the host, since they end up as manifest keys.

use std::fs;
use std::path::{Component, Path};

use crate::error::{CapsuleError, Result};

/// True if something exists at `path`, including a dangling symlink.
pub fn lexists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// True if `path` is a symlink (not followed).
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// `path` relative to `root`, joined with `/`.
pub fn relative_posix(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(parts.join("/"))
}

/// Strip every leading `/` so an absolute image path can be joined under a root.
pub fn root_relative(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Ensure all parent directories of a file exist.
///
/// Creates all parent directories of the given path. If the path has no parents,
/// does nothing (doesn't error).
pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| CapsuleError::io(parent, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_relative_posix() {
        let root = PathBuf::from("/img");
        assert_eq!(
            relative_posix(&root, &root.join("system/lib64/libc.so")).as_deref(),
            Some("system/lib64/libc.so")
        );
        assert_eq!(relative_posix(&root, Path::new("/elsewhere/x")), None);
        assert_eq!(relative_posix(&root, &root).as_deref(), Some(""));
    }

    #[test]
    fn test_root_relative() {
        assert_eq!(root_relative("/system/bin/linker64"), "system/bin/linker64");
        assert_eq!(root_relative("//apex/x"), "apex/x");
        assert_eq!(root_relative("system/bin"), "system/bin");
    }

    #[test]
    fn test_lexists_sees_dangling_symlink() {
        let tmp = tempfile::TempDir::new().unwrap();
        let link = tmp.path().join("dangling");
        std::os::unix::fs::symlink("/does/not/exist", &link).unwrap();
        assert!(lexists(&link));
        assert!(is_symlink(&link));
        assert!(!link.exists());
    }
}

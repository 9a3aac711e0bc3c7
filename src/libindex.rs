//! Library name index.
//!
//! Maps a shared-object file name (`libutils.so`) to the root-relative path
//! the dynamic linker would pick. Built once per run by scanning the
//! directories of [`IndexLayout`] in precedence order: every partition's
//! library dirs first, then each package under the package root in lexical
//! order. The first path seen for a name wins; later duplicates are ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::common::relative_posix;
use crate::error::{CapsuleError, Result};
use crate::profile::IndexLayout;

#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    entries: HashMap<String, String>,
}

impl LibraryIndex {
    pub fn build(root: &Path, layout: &IndexLayout) -> Result<Self> {
        let mut index = Self::default();
        for dir in search_roots(root, layout)? {
            index.scan(root, &dir, &layout.suffix)?;
        }
        tracing::info!("indexed {} shared libraries", index.len());
        Ok(index)
    }

    fn scan(&mut self, root: &Path, dir: &Path, suffix: &str) -> Result<()> {
        for entry in WalkDir::new(dir).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| CapsuleError::walk(dir, e))?;
            let file_type = entry.file_type();
            if file_type.is_dir() || (file_type.is_symlink() && entry.path().is_dir()) {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !name.ends_with(suffix) {
                continue;
            }
            let Some(rel) = relative_posix(root, entry.path()) else {
                continue;
            };
            self.insert(name, rel);
        }
        Ok(())
    }

    /// Insert unless the name is already indexed.
    fn insert(&mut self, name: &str, rel_path: String) {
        match self.entries.get(name) {
            Some(existing) => tracing::debug!("{} shadowed by {}", rel_path, existing),
            None => {
                self.entries.insert(name.to_string(), rel_path);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Existing library directories in precedence order.
pub fn search_roots(root: &Path, layout: &IndexLayout) -> Result<Vec<PathBuf>> {
    let mut roots = Vec::new();

    for partition in &layout.partitions {
        for lib_dir in &layout.lib_dirs {
            let candidate = root.join(partition).join(lib_dir);
            if candidate.is_dir() {
                roots.push(candidate);
            }
        }
    }

    let package_root = layout
        .package_root
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| root.join(p));
    if let Some(package_root) = package_root.filter(|p| p.is_dir()) {
        let mut packages = Vec::new();
        for entry in fs::read_dir(&package_root).map_err(|e| CapsuleError::io(&package_root, e))? {
            let entry = entry.map_err(|e| CapsuleError::io(&package_root, e))?;
            if entry.path().is_dir() {
                packages.push(entry.file_name());
            }
        }
        packages.sort();

        for package in packages {
            for lib_dir in &layout.lib_dirs {
                let candidate = package_root.join(&package).join(lib_dir);
                if candidate.is_dir() {
                    roots.push(candidate);
                }
            }
        }
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_partition_precedence() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "vendor/lib64/libdup.so");
        touch(root, "system/lib64/libdup.so");
        touch(root, "system/lib/libdup.so");

        let index = LibraryIndex::build(root, &IndexLayout::default()).unwrap();
        assert_eq!(index.get("libdup.so"), Some("system/lib64/libdup.so"));
    }

    #[test]
    fn test_lib64_preferred_over_lib() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "vendor/lib/libv.so");
        touch(root, "vendor/lib64/libv.so");

        let index = LibraryIndex::build(root, &IndexLayout::default()).unwrap();
        assert_eq!(index.get("libv.so"), Some("vendor/lib64/libv.so"));
    }

    #[test]
    fn test_packages_after_partitions_in_lexical_order() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "apex/com.b/lib64/libpkg.so");
        touch(root, "apex/com.a/lib64/libpkg.so");
        touch(root, "apex/com.a/lib64/libonly_apex.so");
        touch(root, "odm/lib64/libonly_apex_shadow.so");
        touch(root, "apex/com.a/lib64/libonly_apex_shadow.so");

        let layout = IndexLayout::default();
        let dirs = search_roots(root, &layout).unwrap();
        assert_eq!(
            dirs,
            vec![
                root.join("odm/lib64"),
                root.join("apex/com.a/lib64"),
                root.join("apex/com.b/lib64"),
            ]
        );

        let index = LibraryIndex::build(root, &layout).unwrap();
        assert_eq!(index.get("libpkg.so"), Some("apex/com.a/lib64/libpkg.so"));
        assert_eq!(
            index.get("libonly_apex_shadow.so"),
            Some("odm/lib64/libonly_apex_shadow.so")
        );
    }

    #[test]
    fn test_precedence_follows_layout() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "vendor/lib64/libdup.so");
        touch(root, "system/lib64/libdup.so");

        let layout = IndexLayout {
            partitions: vec!["vendor".to_string(), "system".to_string()],
            ..IndexLayout::default()
        };
        let index = LibraryIndex::build(root, &layout).unwrap();
        assert_eq!(index.get("libdup.so"), Some("vendor/lib64/libdup.so"));
    }

    #[test]
    fn test_recursive_and_suffix_filter() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "system/lib64/hw/android.hardware.foo.so");
        touch(root, "system/lib64/libz.so.1");
        touch(root, "system/lib64/notes.txt");
        std::os::unix::fs::symlink("libgone.so.2", root.join("system/lib64/libgone.so")).unwrap();

        let index = LibraryIndex::build(root, &IndexLayout::default()).unwrap();
        assert_eq!(
            index.get("android.hardware.foo.so"),
            Some("system/lib64/hw/android.hardware.foo.so")
        );
        assert_eq!(index.get("libgone.so"), Some("system/lib64/libgone.so"));
        assert_eq!(index.get("libz.so.1"), None);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_stable_across_builds() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(root, "system/lib64/a/libdup.so");
        touch(root, "system/lib64/b/libdup.so");

        let first = LibraryIndex::build(root, &IndexLayout::default()).unwrap();
        let second = LibraryIndex::build(root, &IndexLayout::default()).unwrap();
        assert_eq!(first.get("libdup.so"), Some("system/lib64/a/libdup.so"));
        assert_eq!(first.get("libdup.so"), second.get("libdup.so"));
    }
}

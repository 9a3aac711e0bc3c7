//! Shared test utilities for capsule tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use capsule::profile::{BinarySpec, ConfigFileSpec, Profile};

/// Test environment with a mock system image and an output location.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock system image root (source of binaries)
    pub rootfs: PathBuf,
    /// Capsule directory (sync destination, not created up front)
    pub dest: PathBuf,
    /// Manifest output path
    pub manifest: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let rootfs = base.join("rootfs");
        fs::create_dir_all(&rootfs).expect("Failed to create rootfs dir");

        Self {
            rootfs,
            dest: base.join("capsule"),
            manifest: base.join("out/capsule.toml"),
            _temp_dir: temp_dir,
        }
    }

    /// Run the full pipeline against this environment.
    pub fn sync(&self, profile: &Profile) -> capsule::Result<capsule::SyncReport> {
        capsule::sync_capsule(&self.rootfs, &self.dest, &self.manifest, profile)
    }

    /// Number of non-directory entries under the destination.
    pub fn dest_file_count(&self) -> usize {
        if !self.dest.exists() {
            return 0;
        }
        walkdir::WalkDir::new(&self.dest)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_type().is_dir())
            .count()
    }
}

/// Profile with the given root binaries and no config of any kind.
pub fn bare_profile(binaries: Vec<BinarySpec>) -> Profile {
    Profile {
        binaries,
        config_files: Vec::new(),
        config_dirs: Vec::new(),
        ..Profile::android()
    }
}

/// Profile with root binaries and optional config files.
pub fn profile_with_config(binaries: Vec<BinarySpec>, config_files: &[&str]) -> Profile {
    Profile {
        config_files: config_files.iter().map(|p| ConfigFileSpec::optional(p)).collect(),
        ..bare_profile(binaries)
    }
}

fn put(buf: &mut [u8], off: usize, value: u64, width: usize) {
    buf[off..off + width].copy_from_slice(&value.to_le_bytes()[..width]);
}

/// Build a little-endian ELF64 dynamic object with the given `DT_NEEDED`
/// names and optional `PT_INTERP`.
pub fn elf64(needed: &[&str], interp: Option<&str>) -> Vec<u8> {
    const BASE: u64 = 0x40_0000;
    let phnum = 2 + usize::from(interp.is_some());
    let mut cursor = 64 + phnum * 56;

    let interp_bytes = interp.map(|s| format!("{}\0", s).into_bytes());
    let interp_off = cursor;
    cursor += interp_bytes.as_ref().map_or(0, Vec::len);

    let strtab_off = cursor;
    let mut strtab = vec![0u8];
    let mut dyn_entries = Vec::new();
    for name in needed {
        dyn_entries.push((1u64, strtab.len() as u64));
        strtab.extend_from_slice(name.as_bytes());
        strtab.push(0);
    }
    dyn_entries.push((5, BASE + strtab_off as u64));
    dyn_entries.push((10, strtab.len() as u64));
    dyn_entries.push((0, 0));
    cursor = (cursor + strtab.len() + 7) & !7;

    let dyn_off = cursor;
    let total = dyn_off + dyn_entries.len() * 16;
    let mut buf = vec![0u8; total];

    buf[..4].copy_from_slice(b"\x7fELF");
    buf[4] = 2;
    buf[5] = 1;
    buf[6] = 1;
    put(&mut buf, 16, 3, 2);
    put(&mut buf, 32, 64, 8);
    put(&mut buf, 54, 56, 2);
    put(&mut buf, 56, phnum as u64, 2);

    let mut phdrs = vec![
        (1u64, 0u64, total as u64),
        (2, dyn_off as u64, (dyn_entries.len() * 16) as u64),
    ];
    if let Some(bytes) = &interp_bytes {
        phdrs.push((3, interp_off as u64, bytes.len() as u64));
    }
    for (i, (p_type, offset, size)) in phdrs.into_iter().enumerate() {
        let at = 64 + i * 56;
        put(&mut buf, at, p_type, 4);
        put(&mut buf, at + 8, offset, 8);
        put(&mut buf, at + 16, BASE + offset, 8);
        put(&mut buf, at + 32, size, 8);
    }

    if let Some(bytes) = &interp_bytes {
        buf[interp_off..interp_off + bytes.len()].copy_from_slice(bytes);
    }
    buf[strtab_off..strtab_off + strtab.len()].copy_from_slice(&strtab);
    for (i, (tag, val)) in dyn_entries.into_iter().enumerate() {
        put(&mut buf, dyn_off + i * 16, tag, 8);
        put(&mut buf, dyn_off + i * 16 + 8, val, 8);
    }
    buf
}

/// Create a mock dynamically linked executable.
pub fn create_mock_binary(path: &Path, needed: &[&str], interp: Option<&str>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for binary");
    }
    fs::write(path, elf64(needed, interp)).expect("Failed to create mock binary");

    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
}

/// Create a mock shared library.
pub fn create_mock_library(path: &Path, needed: &[&str]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for library");
    }
    fs::write(path, elf64(needed, None)).expect("Failed to create mock library");
}

/// Create a symlink, making parent directories as needed.
pub fn create_symlink(target: &str, link: &Path) {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir for symlink");
    }
    std::os::unix::fs::symlink(target, link).expect("Failed to create symlink");
}

/// Write a text file, making parent directories as needed.
pub fn write_file(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
}

/// Assert that a symlink exists and points to the expected target.
pub fn assert_symlink(path: &Path, expected_target: &str) {
    assert!(
        path.is_symlink(),
        "Expected symlink at {}, but it's not a symlink",
        path.display()
    );

    let target = fs::read_link(path).expect("Failed to read symlink");
    assert_eq!(
        target.to_string_lossy(),
        expected_target,
        "Symlink {} points to {:?}, expected {}",
        path.display(),
        target,
        expected_target
    );
}

/// Assert that a file exists.
pub fn assert_file_exists(path: &Path) {
    assert!(path.exists(), "Expected file to exist: {}", path.display());
}

/// Assert that a path does not exist (not even as a dangling symlink).
pub fn assert_not_exists(path: &Path) {
    assert!(
        fs::symlink_metadata(path).is_err(),
        "Expected nothing at {}",
        path.display()
    );
}

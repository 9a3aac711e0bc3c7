//! Capsule manifest.
//!
//! Describes every entry of the materialized tree: regular files by SHA256,
//! symlinks by their literal target. Records are sorted by path before
//! serialization, so the output depends only on the tree's contents and
//! never on directory iteration order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

use crate::common::{ensure_parent_exists, relative_posix};
use crate::error::{CapsuleError, Result};
use crate::materialize::Materialized;
use crate::resolve::Role;

const HEADER: &str = "# Generated by capsule-sync\n";

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub source: String,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "artifact", default)]
    pub artifacts: Vec<ArtifactEntry>,
}

impl Manifest {
    /// Number of records per type.
    pub fn summary(&self) -> BTreeMap<Role, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.artifacts {
            *counts.entry(entry.role).or_insert(0) += 1;
        }
        counts
    }

    pub fn get(&self, path: &str) -> Option<&ArtifactEntry> {
        self.artifacts
            .binary_search_by(|e| e.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.artifacts[i])
    }

    pub fn to_toml(&self) -> Result<String> {
        let body = toml::to_string(self).map_err(|e| CapsuleError::Manifest(e.to_string()))?;
        Ok(format!("{}{}", HEADER, body))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut manifest: Self =
            toml::from_str(text).map_err(|e| CapsuleError::Manifest(e.to_string()))?;
        manifest.artifacts.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(manifest)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = self.to_toml()?;
        ensure_parent_exists(path)?;
        fs::write(path, text).map_err(|e| CapsuleError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CapsuleError::io(path, e))?;
        Self::from_toml(&text)
    }
}

/// Describe every non-directory entry under `dest`.
pub fn synthesize(dest: &Path, materialized: &Materialized) -> Result<Manifest> {
    let mut artifacts = Vec::new();

    for entry in WalkDir::new(dest).follow_links(false) {
        let entry = entry.map_err(|e| CapsuleError::walk(dest, e))?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        let Some(rel) = relative_posix(dest, entry.path()).filter(|r| !r.is_empty()) else {
            continue;
        };
        let source = materialized.source_of(&rel).to_string();

        let record = if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| CapsuleError::io(entry.path(), e))?;
            ArtifactEntry {
                source,
                role: Role::Symlink,
                sha256: None,
                target: Some(target.to_string_lossy().into_owned()),
                path: rel,
            }
        } else {
            ArtifactEntry {
                source,
                role: materialized.role_of(&rel),
                sha256: Some(sha256_file(entry.path())?),
                target: None,
                path: rel,
            }
        };
        artifacts.push(record);
    }

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(Manifest { artifacts })
}

/// SHA256 of a file's contents as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path).map_err(|e| CapsuleError::io(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| CapsuleError::io(path, e))?;
    Ok(format!("{:x}", hasher.finalize()))
}

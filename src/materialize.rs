//! Copy the resolved closure and auxiliary config into the capsule tree.
//!
//! Nothing is staged or rolled back: if a copy fails halfway, whatever was
//! already written stays in the destination.

use std::collections::BTreeMap;
use std::path::Path;

use crate::common::{copy_entry, copy_tree};
use crate::error::{CapsuleError, Result};
use crate::profile::Profile;
use crate::resolve::{Closure, Role};

/// Classification handed to the manifest synthesizer.
#[derive(Debug, Clone, Default)]
pub struct Materialized {
    pub roles: BTreeMap<String, Role>,
    /// Destination path -> source path, both root-relative.
    pub sources: BTreeMap<String, String>,
    /// Copied config directories; anything below them is config.
    pub config_prefixes: Vec<String>,
    pub warnings: Vec<String>,
}

impl Materialized {
    /// Role for a destination path. Anything unclassified is config, whether
    /// or not it sits under a copied config directory.
    pub fn role_of(&self, rel_path: &str) -> Role {
        match self.roles.get(rel_path) {
            Some(role) => *role,
            None => {
                if !self.under_config_dir(rel_path) {
                    tracing::debug!("{} is unclassified, recording as config", rel_path);
                }
                Role::Config
            }
        }
    }

    pub fn under_config_dir(&self, rel_path: &str) -> bool {
        self.config_prefixes.iter().any(|prefix| {
            rel_path == prefix
                || rel_path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    pub fn source_of<'a>(&'a self, rel_path: &'a str) -> &'a str {
        self.sources.get(rel_path).map(String::as_str).unwrap_or(rel_path)
    }

    fn warn(&mut self, message: String) {
        tracing::info!("{}", message);
        self.warnings.push(message);
    }
}

/// Copy every classified artifact, then config files, then config dirs.
pub fn materialize(root: &Path, dest: &Path, profile: &Profile, closure: &Closure) -> Result<Materialized> {
    let mut out = Materialized::default();

    for (rel, role) in &closure.artifacts {
        copy_entry(&root.join(rel), &dest.join(rel))?;
        out.roles.insert(rel.clone(), *role);
        out.sources.insert(rel.clone(), rel.clone());
    }
    tracing::info!("copied {} closure artifacts", closure.artifacts.len());

    for spec in &profile.config_files {
        let src = root.join(&spec.path);
        if !src.exists() {
            if spec.required {
                return Err(CapsuleError::MissingConfigFile(spec.path.clone()));
            }
            out.warn(format!("Config file '{}' missing from system image", spec.path));
            continue;
        }
        copy_entry(&src, &dest.join(&spec.path))?;
        out.roles.entry(spec.path.clone()).or_insert(Role::Config);
        out.sources
            .entry(spec.path.clone())
            .or_insert_with(|| spec.path.clone());
    }

    for rel in &profile.config_dirs {
        let src = root.join(rel);
        if !src.is_dir() {
            out.warn(format!("config directory '{}' missing from system image", rel));
            continue;
        }
        let copied = copy_tree(&src, &dest.join(rel))?;
        tracing::info!("copied {} entries from {}", copied, rel);
        out.config_prefixes.push(rel.trim_end_matches('/').to_string());
    }

    Ok(out)
}

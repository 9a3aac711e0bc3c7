//! Transitive dependency closure.
//!
//! Breadth-first walk from the profile's root binaries over `DT_NEEDED` and
//! `PT_INTERP` edges. Each path is parsed at most once. The walk always runs
//! to completion before unresolved libraries are reported so every offender
//! shows up in a single error. Nothing is copied here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::common::{is_symlink, lexists, root_relative};
use crate::elf::read_elf_metadata;
use crate::error::{CapsuleError, Result};
use crate::libindex::LibraryIndex;
use crate::profile::{BinarySpec, Profile, RewriteRule};

/// Why an entry is part of the capsule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Binary,
    Interpreter,
    Library,
    Config,
    Symlink,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Binary => "binary",
            Role::Interpreter => "interpreter",
            Role::Library => "library",
            Role::Config => "config",
            Role::Symlink => "symlink",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root binaries picked from the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSelection {
    /// First existing candidate of each present spec, in profile order.
    pub selected: Vec<String>,
    /// Optional specs with no candidate present.
    pub optional_missing: Vec<String>,
}

/// The resolved artifact set.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    pub artifacts: BTreeMap<String, Role>,
    /// Referenced but absent from the image; assumed supplied by the base
    /// runtime.
    pub provided_externals: BTreeSet<String>,
    pub optional_missing: Vec<String>,
}

impl Closure {
    pub fn count(&self, role: Role) -> usize {
        self.artifacts.values().filter(|r| **r == role).count()
    }
}

/// Pick the first existing candidate of every spec.
///
/// Fails with every unsatisfied required spec at once.
pub fn select_roots(root: &Path, specs: &[BinarySpec]) -> Result<RootSelection> {
    let mut selection = RootSelection::default();
    let mut missing_required = Vec::new();

    for spec in specs {
        match spec.candidates.iter().find(|c| lexists(&root.join(c))) {
            Some(found) => selection.selected.push(found.clone()),
            None if spec.required => missing_required.push(spec.describe()),
            None => selection.optional_missing.push(spec.describe()),
        }
    }

    if !missing_required.is_empty() {
        missing_required.sort();
        return Err(CapsuleError::MissingRequiredArtifact(missing_required));
    }
    Ok(selection)
}

/// Where to actually read `rel_path` from.
///
/// An absolute symlink target means nothing on the host, so it is tried
/// under the root, then through each matching rewrite rule. Everything else
/// (relative links, regular files) is the literal join.
pub fn resolve_read_path(root: &Path, rel_path: &str, rules: &[RewriteRule]) -> PathBuf {
    let literal = root.join(rel_path);
    if !is_symlink(&literal) {
        return literal;
    }
    let Ok(target) = fs::read_link(&literal) else {
        return literal;
    };
    let Some(target) = target.to_str().filter(|t| t.starts_with('/')) else {
        return literal;
    };

    std::iter::once(root.join(root_relative(target)))
        .chain(
            rules
                .iter()
                .filter_map(|rule| rule.apply(target))
                .map(|rewritten| root.join(root_relative(&rewritten))),
        )
        .find(|candidate| candidate.exists())
        .unwrap_or(literal)
}

/// Walk the dependency graph from the profile's root binaries.
pub fn resolve_closure(root: &Path, profile: &Profile, index: &LibraryIndex) -> Result<Closure> {
    let roots = select_roots(root, &profile.binaries)?;
    for missing in &roots.optional_missing {
        tracing::info!("optional binary '{}' not found in system image", missing);
    }

    let mut closure = Closure {
        optional_missing: roots.optional_missing,
        ..Closure::default()
    };
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut missing_libs: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for selected in roots.selected {
        closure.artifacts.insert(selected.clone(), Role::Binary);
        queue.push_back(selected);
    }

    while let Some(rel_path) = queue.pop_front() {
        if seen.contains(&rel_path) {
            continue;
        }

        let read_path = resolve_read_path(root, &rel_path, &profile.rewrite_rules);
        if !read_path.exists() {
            tracing::debug!("{} not present in image, treating as provided", rel_path);
            closure.artifacts.remove(&rel_path);
            closure.provided_externals.insert(rel_path.clone());
            seen.insert(rel_path);
            continue;
        }

        let info = read_elf_metadata(&read_path)?;
        tracing::debug!(
            "{}: {} needed, interpreter {:?}",
            rel_path,
            info.needed.len(),
            info.interpreter
        );

        if let Some(interp) = &info.interpreter {
            let interp_rel = root_relative(interp).to_string();
            if !interp_rel.is_empty() && !closure.artifacts.contains_key(&interp_rel) {
                if !resolve_read_path(root, &interp_rel, &profile.rewrite_rules).exists() {
                    return Err(CapsuleError::MissingInterpreter {
                        interpreter: interp_rel,
                        referenced_by: rel_path,
                    });
                }
                closure.artifacts.insert(interp_rel.clone(), Role::Interpreter);
                queue.push_back(interp_rel);
            }
        }

        for lib_name in &info.needed {
            let Some(candidate) = index.get(lib_name) else {
                missing_libs
                    .entry(rel_path.clone())
                    .or_default()
                    .push(lib_name.clone());
                continue;
            };
            if !lexists(&root.join(candidate)) {
                closure.provided_externals.insert(candidate.to_string());
                continue;
            }
            if !closure.artifacts.contains_key(candidate) {
                closure.artifacts.insert(candidate.to_string(), Role::Library);
                queue.push_back(candidate.to_string());
            }
        }

        seen.insert(rel_path);
    }

    if !missing_libs.is_empty() {
        return Err(CapsuleError::MissingLibraryDependency(missing_libs));
    }

    tracing::info!(
        "closure: {} binaries, {} interpreters, {} libraries",
        closure.count(Role::Binary),
        closure.count(Role::Interpreter),
        closure.count(Role::Library)
    );
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    #[test]
    fn test_select_roots_first_candidate_wins() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("system/bin/bootstrap")).unwrap();
        fs::write(root.join("system/bin/bootstrap/ps"), b"").unwrap();
        fs::write(root.join("system/bin/sm"), b"").unwrap();

        let specs = vec![
            BinarySpec::required(&["system/bin/sm"]),
            BinarySpec::optional(&["system/bin/ps", "system/bin/bootstrap/ps"]),
            BinarySpec::optional(&["system/bin/absent"]),
        ];
        let sel = select_roots(root, &specs).unwrap();
        assert_eq!(sel.selected, vec!["system/bin/sm", "system/bin/bootstrap/ps"]);
        assert_eq!(sel.optional_missing, vec!["system/bin/absent"]);
    }

    #[test]
    fn test_select_roots_aggregates_required() {
        let tmp = TempDir::new().unwrap();
        let specs = vec![
            BinarySpec::required(&["system/bin/zeta"]),
            BinarySpec::required(&["system/bin/alpha", "system/bin/alt"]),
        ];
        match select_roots(tmp.path(), &specs) {
            Err(CapsuleError::MissingRequiredArtifact(missing)) => assert_eq!(
                missing,
                vec!["system/bin/alpha or system/bin/alt", "system/bin/zeta"]
            ),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_select_roots_accepts_dangling_symlink() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("system/bin")).unwrap();
        symlink("/apex/x/bin/tool", tmp.path().join("system/bin/tool")).unwrap();
        let sel = select_roots(tmp.path(), &[BinarySpec::required(&["system/bin/tool"])]).unwrap();
        assert_eq!(sel.selected, vec!["system/bin/tool"]);
    }

    #[test]
    fn test_resolve_read_path_rewrites_absolute_targets() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("system/bin")).unwrap();
        fs::create_dir_all(root.join("system/apex/com.android.runtime/bin")).unwrap();
        fs::write(root.join("system/apex/com.android.runtime/bin/linker64"), b"").unwrap();
        symlink(
            "/apex/com.android.runtime/bin/linker64",
            root.join("system/bin/linker64"),
        )
        .unwrap();

        let rules = Profile::android().rewrite_rules;
        assert_eq!(
            resolve_read_path(root, "system/bin/linker64", &rules),
            root.join("system/apex/com.android.runtime/bin/linker64")
        );
        // Without rules the literal (dangling) path comes back.
        assert_eq!(
            resolve_read_path(root, "system/bin/linker64", &[]),
            root.join("system/bin/linker64")
        );
    }

    #[test]
    fn test_resolve_read_path_prefers_direct_root_join() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir_all(root.join("apex/rt/bin")).unwrap();
        fs::create_dir_all(root.join("system/apex/rt/bin")).unwrap();
        fs::create_dir_all(root.join("system/bin")).unwrap();
        fs::write(root.join("apex/rt/bin/tool"), b"").unwrap();
        fs::write(root.join("system/apex/rt/bin/tool"), b"").unwrap();
        symlink("/apex/rt/bin/tool", root.join("system/bin/tool")).unwrap();

        let rules = Profile::android().rewrite_rules;
        assert_eq!(
            resolve_read_path(root, "system/bin/tool", &rules),
            root.join("apex/rt/bin/tool")
        );
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(Role::Interpreter.to_string(), "interpreter");
        assert_eq!(serde_json::to_string(&Role::Library).unwrap(), "\"library\"");
    }
}

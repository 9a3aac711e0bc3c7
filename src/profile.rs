//! Declarative capsule profile.
//!
//! Everything the resolver and materializer treat as "fixed" lives here as
//! plain data: which binaries seed the closure, which config files and
//! directories ride along, how absolute symlink targets are mapped back into
//! the source tree, and the directory precedence of the library index.
//!
//! The built-in profile describes an Android system image. A TOML file with
//! the same shape overrides it; any section left out keeps its default.
//!
//! ```toml
//! config_dirs = ["system/etc/selinux"]
//!
//! [[binaries]]
//! candidates = ["system/bin/servicemanager"]
//! required = true
//!
//! [index]
//! partitions = ["system", "vendor"]
//! lib_dirs = ["lib64", "lib"]
//! package_root = "apex"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{CapsuleError, Result};

/// A root binary: the first candidate present in the image wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinarySpec {
    pub candidates: Vec<String>,
    #[serde(default = "default_true")]
    pub required: bool,
}

impl BinarySpec {
    pub fn required(candidates: &[&str]) -> Self {
        Self {
            candidates: candidates.iter().map(|s| s.to_string()).collect(),
            required: true,
        }
    }

    pub fn optional(candidates: &[&str]) -> Self {
        Self {
            required: false,
            ..Self::required(candidates)
        }
    }

    /// Human-readable choice list, e.g. `a or b`.
    pub fn describe(&self) -> String {
        self.candidates.join(" or ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFileSpec {
    pub path: String,
    #[serde(default)]
    pub required: bool,
}

impl ConfigFileSpec {
    pub fn optional(path: &str) -> Self {
        Self {
            path: path.to_string(),
            required: false,
        }
    }
}

/// Maps an absolute symlink target starting with `prefix` to
/// `replacement + rest`, relative to the source root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteRule {
    pub prefix: String,
    pub replacement: String,
}

impl RewriteRule {
    pub fn new(prefix: &str, replacement: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            replacement: replacement.to_string(),
        }
    }

    /// Root-relative rewrite of `target`, if the rule applies.
    pub fn apply(&self, target: &str) -> Option<String> {
        target
            .strip_prefix(&self.prefix)
            .map(|rest| format!("{}{}", self.replacement, rest))
    }
}

/// Scan order of the library index. Earlier directories shadow later ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexLayout {
    /// Partitions in precedence order.
    pub partitions: Vec<String>,
    /// Library subdirectories checked inside each partition and package.
    pub lib_dirs: Vec<String>,
    /// Directory whose immediate children are packages with their own
    /// library dirs, scanned in lexical order after all partitions.
    pub package_root: Option<String>,
    pub suffix: String,
}

impl Default for IndexLayout {
    fn default() -> Self {
        Self {
            partitions: ["system", "system_ext", "product", "vendor", "odm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            lib_dirs: vec!["lib64".to_string(), "lib".to_string()],
            package_root: Some("apex".to_string()),
            suffix: ".so".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub binaries: Vec<BinarySpec>,
    pub config_files: Vec<ConfigFileSpec>,
    pub config_dirs: Vec<String>,
    pub rewrite_rules: Vec<RewriteRule>,
    pub index: IndexLayout,
}

impl Default for Profile {
    fn default() -> Self {
        Self::android()
    }
}

impl Profile {
    /// Core Android service managers and the linker configuration they need.
    pub fn android() -> Self {
        Self {
            binaries: vec![
                BinarySpec::required(&["system/bin/servicemanager"]),
                BinarySpec::required(&["system/bin/hwservicemanager"]),
                BinarySpec::optional(&[
                    "system/bin/property_service",
                    "system/bin/bootstrap/property_service",
                ]),
            ],
            config_files: vec![
                ConfigFileSpec::optional("system/etc/ld.config.txt"),
                ConfigFileSpec::optional("system/etc/ld.config.version.txt"),
                ConfigFileSpec::optional("apex/com.android.runtime/etc/ld.config.txt"),
            ],
            config_dirs: vec!["system/etc/selinux".to_string()],
            rewrite_rules: vec![
                RewriteRule::new("/apex/", "system/apex/"),
                RewriteRule::new("/system/", "system/"),
            ],
            index: IndexLayout::default(),
        }
    }

    /// Parse a TOML profile.
    pub fn from_toml(text: &str) -> Result<Self> {
        let profile: Self = toml::from_str(text).map_err(|e| CapsuleError::Profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load a TOML profile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CapsuleError::io(path, e))?;
        Self::from_toml(&text).map_err(|e| match e {
            CapsuleError::Profile(msg) => CapsuleError::Profile(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    fn validate(&self) -> Result<()> {
        if let Some(spec) = self.binaries.iter().find(|b| b.candidates.is_empty()) {
            return Err(CapsuleError::Profile(format!(
                "binary entry with no candidates (required = {})",
                spec.required
            )));
        }
        if self.index.suffix.is_empty() {
            return Err(CapsuleError::Profile("index suffix must not be empty".to_string()));
        }
        Ok(())
    }

    /// Print the profile in the same shape it is loaded from.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CapsuleError::Profile(e.to_string()))
    }
}

fn default_true() -> bool {
    true
}

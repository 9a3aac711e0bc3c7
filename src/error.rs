//! Error taxonomy for capsule synchronization.
//!
//! Format errors and a missing interpreter abort immediately. Missing root
//! binaries and unresolved libraries are collected first and reported as a
//! single error carrying every offender.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::elf::FormatError;

pub type Result<T> = std::result::Result<T, CapsuleError>;

#[derive(Debug, Error)]
pub enum CapsuleError {
    /// A file could not be parsed as a supported ELF object.
    #[error("{}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: FormatError,
    },

    /// Required root binaries with no existing candidate.
    #[error("Required binaries missing from system image: {}", .0.join(", "))]
    MissingRequiredArtifact(Vec<String>),

    #[error("Interpreter '{interpreter}' referenced by '{referenced_by}' missing from system image")]
    MissingInterpreter {
        interpreter: String,
        referenced_by: String,
    },

    /// Examined path -> library names that are not in the index.
    #[error("{}", format_ledger(.0))]
    MissingLibraryDependency(BTreeMap<String, Vec<String>>),

    #[error("Config file '{0}' missing from system image")]
    MissingConfigFile(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid profile: {0}")]
    Profile(String),

    #[error("manifest: {0}")]
    Manifest(String),

    #[error("cpio archive: {0}")]
    Archive(String),

    #[error("boot image: {0}")]
    BootImage(String),
}

impl CapsuleError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn walk(path: impl AsRef<Path>, source: walkdir::Error) -> Self {
        Self::Walk {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

fn format_ledger(ledger: &BTreeMap<String, Vec<String>>) -> String {
    let mut lines = vec!["Unable to resolve shared library dependencies:".to_string()];
    for (binary, libs) in ledger {
        lines.push(format!("  {}:", binary));
        for name in libs {
            lines.push(format!("    - {}", name));
        }
    }
    lines.join("\n")
}

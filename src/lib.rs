//! capsule-sync library.
//!
//! Extracts the minimal runtime closure of a set of root binaries from an
//! Android-style system image: ELF metadata parsing, library lookup,
//! transitive resolution, copying and the content manifest. The sibling
//! ramdisk tools (`cpio`, `bootimg`) live here too.

pub mod bootimg;
pub mod common;
pub mod config;
pub mod cpio;
pub mod elf;
pub mod error;
pub mod libindex;
pub mod manifest;
pub mod materialize;
pub mod profile;
pub mod resolve;
pub mod sync;

pub use error::{CapsuleError, Result};
pub use manifest::{ArtifactEntry, Manifest};
pub use profile::Profile;
pub use resolve::Role;
pub use sync::{sync_capsule, SyncReport};

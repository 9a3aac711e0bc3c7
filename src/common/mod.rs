//! Shared filesystem utilities.

pub mod files;
pub mod paths;

pub use files::{copy_entry, copy_tree};
pub use paths::{ensure_parent_exists, is_symlink, lexists, relative_posix, root_relative};

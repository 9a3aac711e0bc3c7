//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `sync` - Build a capsule and its manifest
//! - `cpio` - Edit a newc ramdisk archive
//! - `bootimg` - Extract the ramdisk from a boot image
//! - `show` - Display information

mod bootimg;
mod cpio;
pub mod show;
mod sync;

pub use bootimg::cmd_extract_ramdisk;
pub use cpio::cmd_cpio_edit;
pub use show::cmd_show;
pub use sync::cmd_sync;

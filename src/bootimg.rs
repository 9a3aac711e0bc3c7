//! Android boot image ramdisk extraction.
//!
//! Only the fixed v0-style prefix of the header is read; the ramdisk
//! always starts on the page after the kernel.

use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::common::ensure_parent_exists;
use crate::error::{CapsuleError, Result};

pub const BOOT_MAGIC: &[u8; 8] = b"ANDROID!";
/// Magic plus nine little-endian u32 fields.
const HEADER_LEN: usize = 8 + 9 * 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootImageHeader {
    pub kernel_size: u32,
    pub kernel_addr: u32,
    pub ramdisk_size: u32,
    pub ramdisk_addr: u32,
    pub second_size: u32,
    pub second_addr: u32,
    pub tags_addr: u32,
    pub page_size: u32,
    pub header_version: u32,
}

impl BootImageHeader {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BOOT_MAGIC.len() || &bytes[..8] != BOOT_MAGIC {
            let shown = &bytes[..bytes.len().min(8)];
            return Err(CapsuleError::BootImage(format!(
                "not an Android boot image (magic: {:?})",
                String::from_utf8_lossy(shown)
            )));
        }
        if bytes.len() < HEADER_LEN {
            return Err(CapsuleError::BootImage("truncated header".to_string()));
        }

        let field = |i: usize| {
            let at = 8 + i * 4;
            u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        let header = Self {
            kernel_size: field(0),
            kernel_addr: field(1),
            ramdisk_size: field(2),
            ramdisk_addr: field(3),
            second_size: field(4),
            second_addr: field(5),
            tags_addr: field(6),
            page_size: field(7),
            header_version: field(8),
        };
        if header.page_size == 0 {
            return Err(CapsuleError::BootImage("page size is zero".to_string()));
        }
        Ok(header)
    }

    pub fn ramdisk_offset(&self) -> u64 {
        let page = u64::from(self.page_size);
        let kernel_pages = u64::from(self.kernel_size).div_ceil(page);
        page * (1 + kernel_pages)
    }
}

/// Read the header and the ramdisk payload it describes.
pub fn read_ramdisk<R: Read + Seek>(mut reader: R) -> Result<(BootImageHeader, Vec<u8>)> {
    let mut prefix = Vec::with_capacity(HEADER_LEN);
    reader
        .by_ref()
        .take(HEADER_LEN as u64)
        .read_to_end(&mut prefix)
        .map_err(|e| CapsuleError::BootImage(e.to_string()))?;
    let header = BootImageHeader::parse(&prefix)?;

    tracing::info!(
        "header version {}, page size {}, kernel {} bytes, ramdisk {} bytes",
        header.header_version,
        header.page_size,
        header.kernel_size,
        header.ramdisk_size
    );

    let offset = header.ramdisk_offset();
    tracing::info!("ramdisk offset {}", offset);
    reader
        .seek(SeekFrom::Start(offset))
        .map_err(|e| CapsuleError::BootImage(e.to_string()))?;

    let mut ramdisk = Vec::new();
    reader
        .take(u64::from(header.ramdisk_size))
        .read_to_end(&mut ramdisk)
        .map_err(|e| CapsuleError::BootImage(e.to_string()))?;
    if ramdisk.len() != header.ramdisk_size as usize {
        return Err(CapsuleError::BootImage(format!(
            "read {} bytes, expected {}",
            ramdisk.len(),
            header.ramdisk_size
        )));
    }
    Ok((header, ramdisk))
}

/// Extract the ramdisk of `boot_img` into `output`. Returns its size.
pub fn extract_ramdisk(boot_img: &Path, output: &Path) -> Result<usize> {
    let file = fs::File::open(boot_img).map_err(|e| CapsuleError::io(boot_img, e))?;
    let (_, ramdisk) = read_ramdisk(io::BufReader::new(file))?;
    ensure_parent_exists(output)?;
    fs::write(output, &ramdisk).map_err(|e| CapsuleError::io(output, e))?;
    Ok(ramdisk.len())
}

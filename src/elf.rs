//! Dependency metadata straight from ELF bytes.
//!
//! Reads the program headers, the dynamic section and the string table it
//! points at to recover `DT_NEEDED` names and the `PT_INTERP` path. Nothing
//! is executed and no external toolchain (`readelf`, `ldd`) is involved, so
//! this works on foreign-architecture images.
//!
//! Both pointer classes and both byte orders are supported. Section headers,
//! symbol versions and relocations are never looked at.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::error::CapsuleError;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELFCLASS32: u8 = 1;
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;
const PT_INTERP: u32 = 3;

const DT_NULL: i64 = 0;
const DT_NEEDED: i64 = 1;
const DT_STRTAB: i64 = 5;
const DT_STRSZ: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("not an ELF binary")]
    BadMagic,
    #[error("unsupported ELF class {0}")]
    UnsupportedClass(u8),
    #[error("unsupported data encoding {0}")]
    UnsupportedEncoding(u8),
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("unable to resolve STRTAB offset (address {0:#x} not in any PT_LOAD segment)")]
    UnmappedStringTable(u64),
    #[error("DT_NEEDED entries without a DT_STRTAB")]
    MissingStringTable,
    #[error("library name at string table offset {0:#x} is not valid UTF-8")]
    InvalidName(u64),
    #[error("interpreter path is not valid UTF-8")]
    InvalidInterpreter,
}

/// What the dynamic linker would need to load a file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElfMetadata {
    /// `DT_NEEDED` names in dynamic-section order.
    pub needed: Vec<String>,
    /// `PT_INTERP` contents, if any.
    pub interpreter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Elf32,
    Elf64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// `(p_vaddr, p_offset, p_filesz)` of a `PT_LOAD` segment.
#[derive(Debug, Clone, Copy)]
struct LoadSegment {
    vaddr: u64,
    offset: u64,
    filesz: u64,
}

struct Reader<'a> {
    data: &'a [u8],
    class: Class,
    endian: Endian,
}

impl<'a> Reader<'a> {
    fn slice(&self, offset: u64, len: u64, what: &'static str) -> Result<&'a [u8], FormatError> {
        let start = usize::try_from(offset).map_err(|_| FormatError::Truncated(what))?;
        let len = usize::try_from(len).map_err(|_| FormatError::Truncated(what))?;
        let end = start.checked_add(len).ok_or(FormatError::Truncated(what))?;
        self.data.get(start..end).ok_or(FormatError::Truncated(what))
    }

    fn array<const N: usize>(&self, offset: u64, what: &'static str) -> Result<[u8; N], FormatError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.slice(offset, N as u64, what)?);
        Ok(buf)
    }

    fn u16(&self, offset: u64, what: &'static str) -> Result<u16, FormatError> {
        let b = self.array::<2>(offset, what)?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    fn u32(&self, offset: u64, what: &'static str) -> Result<u32, FormatError> {
        let b = self.array::<4>(offset, what)?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }

    fn u64(&self, offset: u64, what: &'static str) -> Result<u64, FormatError> {
        let b = self.array::<8>(offset, what)?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        })
    }

    /// Address-sized unsigned field (`Elf32_Addr` / `Elf64_Addr`).
    fn word(&self, offset: u64, what: &'static str) -> Result<u64, FormatError> {
        match self.class {
            Class::Elf32 => self.u32(offset, what).map(u64::from),
            Class::Elf64 => self.u64(offset, what),
        }
    }

    /// Address-sized signed field (`d_tag`).
    fn sword(&self, offset: u64, what: &'static str) -> Result<i64, FormatError> {
        match self.class {
            Class::Elf32 => self.u32(offset, what).map(|v| i64::from(v as i32)),
            Class::Elf64 => self.u64(offset, what).map(|v| v as i64),
        }
    }
}

/// Parse dependency metadata out of raw file bytes.
pub fn parse_elf_metadata(data: &[u8]) -> Result<ElfMetadata, FormatError> {
    if data.len() < EI_NIDENT || &data[..4] != ELF_MAGIC {
        return Err(FormatError::BadMagic);
    }
    let class = match data[EI_CLASS] {
        ELFCLASS32 => Class::Elf32,
        ELFCLASS64 => Class::Elf64,
        other => return Err(FormatError::UnsupportedClass(other)),
    };
    let endian = match data[EI_DATA] {
        ELFDATA2LSB => Endian::Little,
        ELFDATA2MSB => Endian::Big,
        other => return Err(FormatError::UnsupportedEncoding(other)),
    };
    let r = Reader { data, class, endian };

    let (phoff, phentsize, phnum) = match class {
        Class::Elf64 => (
            r.u64(32, "ELF header")?,
            r.u16(54, "ELF header")?,
            r.u16(56, "ELF header")?,
        ),
        Class::Elf32 => (
            u64::from(r.u32(28, "ELF header")?),
            r.u16(42, "ELF header")?,
            r.u16(44, "ELF header")?,
        ),
    };

    let mut loads: Vec<LoadSegment> = Vec::new();
    let mut dynamic: Option<(u64, u64)> = None;
    let mut interpreter = None;

    for idx in 0..u64::from(phnum) {
        let base = idx
            .checked_mul(u64::from(phentsize))
            .and_then(|rel| rel.checked_add(phoff))
            .ok_or(FormatError::Truncated("program header table"))?;
        let what = "program header";
        let p_type = r.u32(base, what)?;
        let (p_offset, p_vaddr, p_filesz) = match class {
            Class::Elf64 => (r.u64(base + 8, what)?, r.u64(base + 16, what)?, r.u64(base + 32, what)?),
            Class::Elf32 => (
                u64::from(r.u32(base + 4, what)?),
                u64::from(r.u32(base + 8, what)?),
                u64::from(r.u32(base + 16, what)?),
            ),
        };

        match p_type {
            PT_LOAD => loads.push(LoadSegment {
                vaddr: p_vaddr,
                offset: p_offset,
                filesz: p_filesz,
            }),
            PT_DYNAMIC => dynamic = Some((p_offset, p_filesz)),
            PT_INTERP => interpreter = read_interpreter(&r, p_offset, p_filesz)?,
            _ => {}
        }
    }

    let mut needed_offsets = Vec::new();
    let mut strtab_vaddr = None;
    let mut strtab_size = None;

    if let Some((dyn_off, dyn_size)) = dynamic {
        let entry_size: u64 = match class {
            Class::Elf64 => 16,
            Class::Elf32 => 8,
        };
        let len = data.len() as u64;
        let mut cursor = 0;
        while cursor < dyn_size {
            let at = dyn_off.saturating_add(cursor);
            if at.saturating_add(entry_size) > len {
                break;
            }
            let tag = r.sword(at, "dynamic section")?;
            let val = r.word(at + entry_size / 2, "dynamic section")?;
            match tag {
                DT_NULL => break,
                DT_NEEDED => needed_offsets.push(val),
                DT_STRTAB => strtab_vaddr = Some(val),
                DT_STRSZ => strtab_size = Some(val),
                _ => {}
            }
            cursor += entry_size;
        }
    }

    let mut needed = Vec::new();
    if !needed_offsets.is_empty() {
        let vaddr = strtab_vaddr.ok_or(FormatError::MissingStringTable)?;
        let strtab_off =
            virt_to_file(&loads, vaddr).ok_or(FormatError::UnmappedStringTable(vaddr))?;
        for rel in needed_offsets {
            if let Some(name) = read_name(data, strtab_off, strtab_size, rel)? {
                needed.push(name);
            }
        }
    }

    Ok(ElfMetadata {
        needed,
        interpreter,
    })
}

/// Read and parse a file from disk.
pub fn read_elf_metadata(path: &Path) -> crate::error::Result<ElfMetadata> {
    let data = fs::read(path).map_err(|e| CapsuleError::io(path, e))?;
    parse_elf_metadata(&data).map_err(|source| CapsuleError::Format {
        path: path.to_path_buf(),
        source,
    })
}

fn read_interpreter(r: &Reader<'_>, offset: u64, filesz: u64) -> Result<Option<String>, FormatError> {
    let segment = r.slice(offset, filesz, "PT_INTERP segment")?;
    let end = segment.iter().position(|&b| b == 0).unwrap_or(segment.len());
    let path = std::str::from_utf8(&segment[..end]).map_err(|_| FormatError::InvalidInterpreter)?;
    Ok((!path.is_empty()).then(|| path.to_string()))
}

/// First `PT_LOAD` segment whose file-backed range covers `vaddr`.
fn virt_to_file(loads: &[LoadSegment], vaddr: u64) -> Option<u64> {
    loads
        .iter()
        .find(|seg| seg.vaddr <= vaddr && vaddr < seg.vaddr.saturating_add(seg.filesz))
        .and_then(|seg| seg.offset.checked_add(vaddr - seg.vaddr))
}

/// NUL-terminated string at `strtab_off + rel`.
///
/// The terminator is searched inside the table first; a table size that is
/// missing or too small falls back to the next NUL anywhere in the file.
fn read_name(
    data: &[u8],
    strtab_off: u64,
    strtab_size: Option<u64>,
    rel: u64,
) -> Result<Option<String>, FormatError> {
    let Some(start) = strtab_off
        .checked_add(rel)
        .and_then(|s| usize::try_from(s).ok())
        .filter(|&s| s < data.len())
    else {
        return Ok(None);
    };

    let table_end = strtab_size
        .and_then(|size| strtab_off.checked_add(size))
        .and_then(|end| usize::try_from(end).ok())
        .map(|end| end.min(data.len()))
        .filter(|&end| end > start);

    let in_table = table_end.and_then(|end| data[start..end].iter().position(|&b| b == 0));
    let len = match in_table {
        Some(len) => len,
        None => data[start..]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(data.len() - start),
    };

    let name = std::str::from_utf8(&data[start..start + len])
        .map_err(|_| FormatError::InvalidName(rel))?;
    Ok((!name.is_empty()).then(|| name.to_string()))
}

//! In-place editing of newc ("new ASCII") cpio archives.
//!
//! Ramdisks carry device nodes and ownership that cannot be recreated by
//! unpacking as an unprivileged user, so edits happen on the archive
//! entries directly. Every header field survives a read/write cycle, as does
//! any padding after the trailer.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::path::{Path, PathBuf};

use crate::error::{CapsuleError, Result};

/// newc header size
const HEADER_SIZE: usize = 110;
const MAGIC_NEWC: &[u8] = b"070701";
const ALIGNMENT: usize = 4;
pub const TRAILER: &str = "TRAILER!!!";

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioEntry {
    pub name: String,
    pub ino: u32,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: u32,
    pub devmajor: u32,
    pub devminor: u32,
    pub rdevmajor: u32,
    pub rdevminor: u32,
    pub check: u32,
    pub data: Vec<u8>,
}

impl CpioEntry {
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == S_IFLNK
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let name_len = self.name.len() + 1;
        let fields = [
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.nlink,
            self.mtime,
            self.data.len() as u32,
            self.devmajor,
            self.devminor,
            self.rdevmajor,
            self.rdevminor,
            name_len as u32,
            self.check,
        ];
        w.write_all(MAGIC_NEWC)?;
        for field in fields {
            write!(w, "{:08x}", field)?;
        }
        w.write_all(self.name.as_bytes())?;
        w.write_all(&[0])?;
        w.write_all(&[0u8; ALIGNMENT][..padding(HEADER_SIZE + name_len)])?;
        w.write_all(&self.data)?;
        w.write_all(&[0u8; ALIGNMENT][..padding(self.data.len())])?;
        Ok(())
    }
}

/// Bytes needed to bring `len` up to the next 4-byte boundary.
fn padding(len: usize) -> usize {
    (ALIGNMENT - len % ALIGNMENT) % ALIGNMENT
}

/// A complete archive, always terminated by a `TRAILER!!!` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioArchive {
    entries: Vec<CpioEntry>,
    trailing_padding: Vec<u8>,
}

impl CpioArchive {
    pub fn new(entries: Vec<CpioEntry>, trailing_padding: Vec<u8>) -> Result<Self> {
        if entries.last().map(|e| e.name.as_str()) != Some(TRAILER) {
            return Err(CapsuleError::Archive(format!(
                "cpio archive must end with {} entry",
                TRAILER
            )));
        }
        Ok(Self {
            entries,
            trailing_padding,
        })
    }

    /// All entries including the trailer.
    pub fn entries(&self) -> &[CpioEntry] {
        &self.entries
    }

    pub fn trailer(&self) -> &CpioEntry {
        &self.entries[self.entries.len() - 1]
    }

    pub fn without_trailer(&self) -> &[CpioEntry] {
        &self.entries[..self.entries.len() - 1]
    }

    pub fn get(&self, name: &str) -> Option<&CpioEntry> {
        self.without_trailer().iter().find(|e| e.name == name)
    }

    pub fn trailing_padding(&self) -> &[u8] {
        &self.trailing_padding
    }

    /// One past the highest inode in use, `None` once the inode space is
    /// exhausted.
    pub fn next_inode(&self) -> Option<u32> {
        self.without_trailer()
            .iter()
            .map(|e| e.ino)
            .max()
            .unwrap_or(0)
            .checked_add(1)
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut entries = Vec::new();

        loop {
            let mut header = [0u8; HEADER_SIZE];
            let got = read_up_to(&mut reader, &mut header)?;
            if got == 0 {
                if entries.is_empty() {
                    return Err(CapsuleError::Archive("empty cpio archive".to_string()));
                }
                return Err(CapsuleError::Archive(format!(
                    "missing {} entry in cpio archive",
                    TRAILER
                )));
            }
            if got != HEADER_SIZE {
                return Err(CapsuleError::Archive("truncated cpio header".to_string()));
            }
            if &header[..6] != MAGIC_NEWC {
                return Err(CapsuleError::Archive(
                    "unsupported cpio format (expected newc)".to_string(),
                ));
            }

            let mut fields = [0u32; 13];
            for (i, field) in fields.iter_mut().enumerate() {
                let start = 6 + i * 8;
                *field = parse_hex(&header[start..start + 8])?;
            }
            let [ino, mode, uid, gid, nlink, mtime, filesize, devmajor, devminor, rdevmajor, rdevminor, namesize, check] =
                fields;

            let mut name_buf = vec![0u8; namesize as usize];
            read_exact(&mut reader, &mut name_buf)?;
            if name_buf.last() == Some(&0) {
                name_buf.pop();
            }
            let name = String::from_utf8(name_buf)
                .map_err(|_| CapsuleError::Archive("entry name is not valid UTF-8".to_string()))?;
            skip(&mut reader, padding(HEADER_SIZE + namesize as usize))?;

            let mut data = vec![0u8; filesize as usize];
            read_exact(&mut reader, &mut data)?;
            skip(&mut reader, padding(filesize as usize))?;

            let is_trailer = name == TRAILER;
            entries.push(CpioEntry {
                name,
                ino,
                mode,
                uid,
                gid,
                nlink,
                mtime,
                devmajor,
                devminor,
                rdevmajor,
                rdevminor,
                check,
                data,
            });
            if is_trailer {
                break;
            }
        }

        let mut trailing_padding = Vec::new();
        reader
            .read_to_end(&mut trailing_padding)
            .map_err(|e| CapsuleError::Archive(e.to_string()))?;
        Self::new(entries, trailing_padding)
    }

    pub fn write_to<W: Write>(&self, mut w: W) -> io::Result<()> {
        for entry in &self.entries {
            entry.write_to(&mut w)?;
        }
        w.write_all(&self.trailing_padding)?;
        w.flush()
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| CapsuleError::io(path, e))?;
        Self::read_from(io::BufReader::new(file))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path).map_err(|e| CapsuleError::io(path, e))?;
        self.write_to(io::BufWriter::new(file))
            .map_err(|e| CapsuleError::io(path, e))
    }

    /// Apply edits in order: remove, rename, replace, then append additions
    /// before the trailer.
    pub fn edit(&self, edits: &ArchiveEdits) -> Result<Self> {
        let mut updated = Vec::with_capacity(self.entries.len() + edits.add.len());

        for entry in self.without_trailer() {
            if edits.remove.iter().any(|r| *r == entry.name) {
                continue;
            }
            let mut new_entry = entry.clone();
            if let Some(renamed) = edits.rename.get(&entry.name) {
                new_entry.name = renamed.clone();
            }
            if let Some(source) = edits.replace.get(&new_entry.name) {
                let mut replacement = entry_from_path(&new_entry.name, source, new_entry.ino)?;
                // Ownership and link count come from the stock entry.
                replacement.uid = new_entry.uid;
                replacement.gid = new_entry.gid;
                replacement.nlink = new_entry.nlink;
                replacement.devmajor = new_entry.devmajor;
                replacement.devminor = new_entry.devminor;
                new_entry = replacement;
            }
            updated.push(new_entry);
        }

        let mut next_ino = self.next_inode();
        for (name, source) in &edits.add {
            let ino = next_ino.ok_or_else(|| {
                CapsuleError::Archive(format!("no free inode number left for '{}'", name))
            })?;
            updated.push(entry_from_path(name, source, ino)?);
            next_ino = ino.checked_add(1);
        }

        updated.push(self.trailer().clone());
        Self::new(updated, self.trailing_padding.clone())
    }
}

/// Edits requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct ArchiveEdits {
    pub rename: BTreeMap<String, String>,
    pub replace: BTreeMap<String, PathBuf>,
    pub remove: Vec<String>,
    /// Added in order; a repeated name keeps its first position.
    pub add: Vec<(String, PathBuf)>,
}

impl ArchiveEdits {
    pub fn from_args(rename: &[String], replace: &[String], remove: &[String], add: &[String]) -> Result<Self> {
        let mut edits = Self {
            remove: remove.to_vec(),
            ..Self::default()
        };
        for (old, new) in parse_mapping(rename)? {
            edits.rename.insert(old, new);
        }
        for (name, path) in parse_mapping(replace)? {
            edits.replace.insert(name, PathBuf::from(path));
        }
        for (name, path) in parse_mapping(add)? {
            let path = PathBuf::from(path);
            match edits.add.iter_mut().find(|(n, _)| *n == name) {
                Some(existing) => existing.1 = path,
                None => edits.add.push((name, path)),
            }
        }
        Ok(edits)
    }
}

/// Parse `KEY=VALUE` items, splitting on the first `=`.
pub fn parse_mapping(items: &[String]) -> Result<Vec<(String, String)>> {
    items
        .iter()
        .map(|item| {
            let (key, value) = item.split_once('=').ok_or_else(|| {
                CapsuleError::Archive(format!("invalid mapping '{}', expected KEY=VALUE", item))
            })?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return Err(CapsuleError::Archive(format!(
                    "invalid mapping '{}', empty key or value",
                    item
                )));
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Build an entry from a host filesystem object (not followed if a symlink).
pub fn entry_from_path(name: &str, path: &Path, ino: u32) -> Result<CpioEntry> {
    let meta = fs::symlink_metadata(path).map_err(|e| CapsuleError::io(path, e))?;
    let file_type = meta.file_type();
    let perm = meta.mode() & 0o7777;

    let (mode, data, rdev) = if file_type.is_symlink() {
        let target = fs::read_link(path).map_err(|e| CapsuleError::io(path, e))?;
        (S_IFLNK | perm, target.to_string_lossy().into_owned().into_bytes(), None)
    } else if file_type.is_file() {
        let data = fs::read(path).map_err(|e| CapsuleError::io(path, e))?;
        (S_IFREG | perm, data, None)
    } else if file_type.is_dir() {
        (S_IFDIR | perm, Vec::new(), None)
    } else if file_type.is_char_device() || file_type.is_block_device() {
        (meta.mode(), Vec::new(), Some(meta.rdev()))
    } else {
        return Err(CapsuleError::Archive(format!(
            "unsupported file type for {}",
            path.display()
        )));
    };

    Ok(CpioEntry {
        name: name.to_string(),
        ino,
        mode,
        uid: 0,
        gid: 0,
        nlink: 1,
        mtime: meta.mtime().clamp(0, i64::from(u32::MAX)) as u32,
        devmajor: 0,
        devminor: 0,
        rdevmajor: rdev.map_or(0, dev_major),
        rdevminor: rdev.map_or(0, dev_minor),
        check: 0,
        data,
    })
}

/// Linux `dev_t` major number.
fn dev_major(dev: u64) -> u32 {
    (((dev >> 8) & 0xfff) | ((dev >> 32) & !0xfff)) as u32
}

/// Linux `dev_t` minor number.
fn dev_minor(dev: u64) -> u32 {
    ((dev & 0xff) | ((dev >> 12) & !0xff)) as u32
}

fn parse_hex(field: &[u8]) -> Result<u32> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 16).ok())
        .ok_or_else(|| {
            CapsuleError::Archive(format!(
                "invalid header field {:?}",
                String::from_utf8_lossy(field)
            ))
        })
}

/// Fill as much of `buf` as the stream allows.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(CapsuleError::Archive(e.to_string())),
        }
    }
    Ok(filled)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            CapsuleError::Archive("unexpected end of cpio stream".to_string())
        }
        _ => CapsuleError::Archive(e.to_string()),
    })
}

/// Skip alignment padding; a stream that ends inside it is tolerated.
fn skip<R: Read>(reader: &mut R, n: usize) -> Result<()> {
    let mut pad = [0u8; ALIGNMENT];
    read_up_to(reader, &mut pad[..n]).map(|_| ())
}

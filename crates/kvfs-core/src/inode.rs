// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fixed-layout inode records.
//!
//! On-disk layout, little-endian throughout:
//!
//! ```text
//! size(u32) | mode(u16) | atime(f64 ms) | mtime(f64 ms) | ctime(f64 ms) | id(ASCII, remainder)
//! ```
//!
//! `id` is the store key of this inode's content blob: raw bytes for a
//! file, a UTF-8 JSON `{name: inode-id}` object for a directory.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{FsError, FsResult};

const HEADER_LEN: usize = 4 + 2 + 8 + 8 + 8;

/// Node type, carried in the high nibble of the mode word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl FileType {
    pub const MASK: u16 = 0xF000;
    const FILE_BITS: u16 = 0x8000;
    const DIR_BITS: u16 = 0x4000;
    const SYMLINK_BITS: u16 = 0xA000;

    pub fn to_mode_bits(self) -> u16 {
        match self {
            FileType::File => Self::FILE_BITS,
            FileType::Directory => Self::DIR_BITS,
            FileType::Symlink => Self::SYMLINK_BITS,
        }
    }

    pub fn from_mode(mode: u16) -> Option<FileType> {
        match mode & Self::MASK {
            Self::FILE_BITS => Some(FileType::File),
            Self::DIR_BITS => Some(FileType::Directory),
            Self::SYMLINK_BITS => Some(FileType::Symlink),
            _ => None,
        }
    }
}

/// Stat metadata as seen by callers. Timestamps are milliseconds since the
/// Unix epoch, matching the on-disk representation exactly.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stats {
    pub size: u64,
    pub mode: u16,
    pub file_type: FileType,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
}

impl Stats {
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.file_type == FileType::File
    }

    /// Permission bits without the type nibble.
    pub fn perm(&self) -> u16 {
        self.mode & !FileType::MASK
    }
}

/// Metadata record for one file or directory.
#[derive(Clone, Debug, PartialEq)]
pub struct Inode {
    /// Store key of the content blob.
    pub id: String,
    pub size: u32,
    pub mode: u16,
    pub atime_ms: f64,
    pub mtime_ms: f64,
    pub ctime_ms: f64,
}

impl Inode {
    pub fn new(id: String, file_type: FileType, perm: u16, size: u32, now_ms: f64) -> Self {
        Self {
            id,
            size,
            mode: file_type.to_mode_bits() | (perm & !FileType::MASK),
            atime_ms: now_ms,
            mtime_ms: now_ms,
            ctime_ms: now_ms,
        }
    }

    pub fn file_type(&self) -> FsResult<FileType> {
        FileType::from_mode(self.mode).ok_or_else(|| {
            FsError::io(self.id.clone(), format!("invalid mode {:#06x}", self.mode))
        })
    }

    pub fn is_dir(&self) -> bool {
        FileType::from_mode(self.mode) == Some(FileType::Directory)
    }

    pub fn is_file(&self) -> bool {
        FileType::from_mode(self.mode) == Some(FileType::File)
    }

    pub fn to_stats(&self) -> FsResult<Stats> {
        Ok(Stats {
            size: self.size as u64,
            mode: self.mode,
            file_type: self.file_type()?,
            atime_ms: self.atime_ms,
            mtime_ms: self.mtime_ms,
            ctime_ms: self.ctime_ms,
        })
    }

    /// Fold `stats` into this record, reporting whether anything actually
    /// changed. Callers skip the inode rewrite when nothing did.
    pub fn update(&mut self, stats: &Stats) -> bool {
        let mut changed = false;
        if self.size as u64 != stats.size {
            self.size = stats.size as u32;
            changed = true;
        }
        if self.mode != stats.mode {
            self.mode = stats.mode;
            changed = true;
        }
        if self.atime_ms != stats.atime_ms {
            self.atime_ms = stats.atime_ms;
            changed = true;
        }
        if self.mtime_ms != stats.mtime_ms {
            self.mtime_ms = stats.mtime_ms;
            changed = true;
        }
        if self.ctime_ms != stats.ctime_ms {
            self.ctime_ms = stats.ctime_ms;
            changed = true;
        }
        changed
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.id.len());
        out.extend_from_slice(&self.size.to_le_bytes());
        out.extend_from_slice(&self.mode.to_le_bytes());
        out.extend_from_slice(&self.atime_ms.to_le_bytes());
        out.extend_from_slice(&self.mtime_ms.to_le_bytes());
        out.extend_from_slice(&self.ctime_ms.to_le_bytes());
        out.extend_from_slice(self.id.as_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> FsResult<Inode> {
        if data.len() < HEADER_LEN {
            return Err(FsError::io(
                "<inode>",
                format!("truncated inode record ({} bytes)", data.len()),
            ));
        }
        let size = u32::from_le_bytes(data[0..4].try_into().unwrap());
        let mode = u16::from_le_bytes(data[4..6].try_into().unwrap());
        let atime_ms = f64::from_le_bytes(data[6..14].try_into().unwrap());
        let mtime_ms = f64::from_le_bytes(data[14..22].try_into().unwrap());
        let ctime_ms = f64::from_le_bytes(data[22..30].try_into().unwrap());
        let id = std::str::from_utf8(&data[HEADER_LEN..])
            .map_err(|_| FsError::io("<inode>", "non-ASCII id in inode record"))?
            .to_string();
        Ok(Inode {
            id,
            size,
            mode,
            atime_ms,
            mtime_ms,
            ctime_ms,
        })
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The filesystem contract consumed by the overlay and the mount router.
//!
//! Paths are absolute `/`-separated strings; implementations normalize at
//! the boundary. All operations are synchronous: the overlay and mount
//! compositions require `supports_sync`, and an async-backed adapter that
//! cannot provide it must return `false` there.

use crate::error::FsResult;
use crate::inode::Stats;

/// Opaque handle to an open file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandleId(pub u64);

/// How an opened handle will be used. Composed filesystems route on this:
/// an overlay copies a readable-only entry up before handing out a
/// read-write handle, but serves read handles straight from the layer
/// that holds the entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
}

pub trait FileSystem: Send + Sync {
    fn name(&self) -> &str;

    fn is_read_only(&self) -> bool;

    fn supports_sync(&self) -> bool {
        true
    }

    fn stat(&self, path: &str) -> FsResult<Stats>;

    fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    fn mkdir(&self, path: &str, perm: u16) -> FsResult<()>;

    /// Child names of a directory, no ordering guarantee.
    fn readdir(&self, path: &str) -> FsResult<Vec<String>>;

    fn unlink(&self, path: &str) -> FsResult<()>;

    fn rmdir(&self, path: &str) -> FsResult<()>;

    fn rename(&self, old: &str, new: &str) -> FsResult<()>;

    fn chmod(&self, path: &str, perm: u16) -> FsResult<()>;

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()>;

    fn utimes(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()>;

    fn truncate(&self, path: &str, len: u64) -> FsResult<()>;

    /// Whole-file read convenience wrapper.
    fn read_file(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Whole-file write convenience wrapper; creates the file when absent,
    /// replaces its content when present.
    fn write_file(&self, path: &str, data: &[u8], perm: u16) -> FsResult<()>;

    /// Open an existing file, materializing its content behind a handle.
    fn open(&self, path: &str, mode: OpenMode) -> FsResult<HandleId>;

    /// Create a new empty file and open it read-write.
    fn create(&self, path: &str, perm: u16) -> FsResult<HandleId>;

    fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize>;

    /// Buffered write; nothing reaches storage until `sync` or `close`.
    fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize>;

    fn sync(&self, handle: HandleId) -> FsResult<()>;

    fn close(&self, handle: HandleId) -> FsResult<()>;
}

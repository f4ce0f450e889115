// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Synchronous key-value filesystem engine.
//!
//! Emulates a POSIX-like tree over any [`KeyValueStore`]. Directory
//! listings are JSON `{name: inode-key}` blobs; inode records use the
//! fixed layout in [`crate::inode`]. Every multi-step mutation runs inside
//! one [`Transaction`] and either commits whole or aborts, leaving the
//! store untouched.
//!
//! Path resolution walks parent-first with one store round trip per
//! component and no cross-call caching; the cost is O(depth) per lookup.

pub mod async_fs;

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs::{FileSystem, HandleId, OpenMode};
use crate::ids::{IdGenerator, UuidIds};
use crate::inode::{now_ms, FileType, Inode, Stats};
use crate::path;
use crate::store::{InMemoryStore, KeyValueStore, Transaction, TransactionMode};

/// Fixed store key of the root directory's inode record.
pub(crate) const ROOT_KEY: &str = "/";

/// Attempts at allocating a unique store key before giving up with EIO.
pub(crate) const MAX_ID_ATTEMPTS: u32 = 5;

/// An open file: the full content blob materialized in memory, plus the
/// working stat view. `dirty` marks unsynced content; stat divergence is
/// detected at sync time via `Inode::update`.
struct OpenFile {
    path: String,
    mode: OpenMode,
    inode_key: String,
    inode: Inode,
    stats: Stats,
    buffer: Vec<u8>,
    dirty: bool,
}

/// The generic filesystem engine over a synchronous key-value store.
pub struct KeyValueFs<S: KeyValueStore> {
    store: S,
    ids: Box<dyn IdGenerator>,
    handles: Mutex<HashMap<HandleId, OpenFile>>,
    next_handle: Mutex<u64>,
}

impl KeyValueFs<InMemoryStore> {
    /// Engine over a fresh in-memory store, with random ids.
    pub fn in_memory(name: impl Into<String>) -> FsResult<Self> {
        Self::new(InMemoryStore::new(name), Box::new(UuidIds))
    }
}

impl<S: KeyValueStore> KeyValueFs<S> {
    pub fn new(store: S, ids: Box<dyn IdGenerator>) -> FsResult<Self> {
        let fs = Self {
            store,
            ids,
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
        };
        fs.make_root_directory()?;
        Ok(fs)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Create the root inode once if the store does not hold one yet.
    fn make_root_directory(&self) -> FsResult<()> {
        self.with_rw_tx(|tx| {
            if tx.get(ROOT_KEY)?.is_some() {
                return Ok(());
            }
            let blob_key = self.add_new_node(tx, "/", b"{}")?;
            let inode = Inode::new(blob_key, FileType::Directory, 0o777, 2, now_ms());
            tx.put(ROOT_KEY, &inode.to_bytes(), false)?;
            tracing::debug!(store = self.store.name(), "created root directory");
            Ok(())
        })
    }

    // ---- transaction scaffolding ------------------------------------------

    fn with_rw_tx<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> FsResult<T>) -> FsResult<T> {
        let mut tx = Transaction::new(&self.store, TransactionMode::ReadWrite);
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort() {
                    tracing::warn!(%abort_err, "abort failed; store may retain partial writes");
                }
                Err(err)
            }
        }
    }

    fn with_ro_tx<T>(&self, f: impl FnOnce(&Transaction<'_>) -> FsResult<T>) -> FsResult<T> {
        let tx = Transaction::new(&self.store, TransactionMode::ReadOnly);
        let result = f(&tx);
        tx.commit()?;
        result
    }

    // ---- node plumbing ----------------------------------------------------

    fn get_inode(&self, tx: &Transaction<'_>, path: &str, key: &str) -> FsResult<Inode> {
        let bytes = tx.get(key)?.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        Inode::from_bytes(&bytes)
    }

    /// Resolve `path` to its inode record key and decoded inode.
    ///
    /// The parent is resolved recursively and the final component looked up
    /// in its listing; the root short-circuits to the well-known key.
    fn find_inode(&self, tx: &Transaction<'_>, path: &str) -> FsResult<(String, Inode)> {
        if path == "/" {
            return Ok((ROOT_KEY.to_string(), self.get_inode(tx, path, ROOT_KEY)?));
        }
        let parent = path::dirname(path);
        let (_, parent_inode) = self.find_inode(tx, parent)?;
        let listing = self.dir_listing(tx, parent, &parent_inode)?;
        let key = listing
            .get(path::basename(path))
            .ok_or_else(|| FsError::NotFound(path.to_string()))?
            .clone();
        let inode = self.get_inode(tx, path, &key)?;
        Ok((key, inode))
    }

    /// Fetch and parse a directory's listing blob.
    fn dir_listing(
        &self,
        tx: &Transaction<'_>,
        path: &str,
        inode: &Inode,
    ) -> FsResult<HashMap<String, String>> {
        if !inode.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        // A directory inode whose blob is gone is a dangling node.
        let blob = tx.get(&inode.id)?.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        serde_json::from_slice(&blob).map_err(|e| FsError::io(path, e.to_string()))
    }

    fn put_listing(
        &self,
        tx: &mut Transaction<'_>,
        path: &str,
        blob_key: &str,
        listing: &HashMap<String, String>,
    ) -> FsResult<()> {
        let bytes = serde_json::to_vec(listing).map_err(|e| FsError::io(path, e.to_string()))?;
        tx.put(blob_key, &bytes, true)?;
        Ok(())
    }

    /// Store `data` under a freshly generated key.
    ///
    /// The store has no unique-create primitive, so this relies on
    /// insert-if-absent `put` and retries on a genuine collision signal
    /// (`put` returning false). Arbitrary store errors propagate
    /// immediately; exhausting the attempts is surfaced as an i/o error.
    fn add_new_node(
        &self,
        tx: &mut Transaction<'_>,
        path: &str,
        data: &[u8],
    ) -> FsResult<String> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let key = self.ids.generate();
            if tx.put(&key, data, false)? {
                return Ok(key);
            }
            tracing::warn!(%path, attempt, "generated store key collided; retrying");
        }
        Err(FsError::io(path, "unable to allocate a unique store key"))
    }

    /// Create a file or directory node at `path` inside one transaction:
    /// parent resolution, collision check, blob + inode allocation, and
    /// the parent listing rewrite all commit or abort together.
    fn commit_new_node(
        &self,
        norm: &str,
        file_type: FileType,
        perm: u16,
        data: &[u8],
    ) -> FsResult<(String, Inode)> {
        self.with_rw_tx(|tx| {
            if norm == "/" {
                return Err(FsError::AlreadyExists(norm.to_string()));
            }
            let parent = path::dirname(norm);
            let (_, parent_inode) = self.find_inode(tx, parent)?;
            let mut listing = self.dir_listing(tx, parent, &parent_inode)?;
            let name = path::basename(norm);
            if listing.contains_key(name) {
                return Err(FsError::AlreadyExists(norm.to_string()));
            }
            let blob_key = self.add_new_node(tx, norm, data)?;
            let inode = Inode::new(blob_key, file_type, perm, data.len() as u32, now_ms());
            let inode_key = self.add_new_node(tx, norm, &inode.to_bytes())?;
            listing.insert(name.to_string(), inode_key.clone());
            self.put_listing(tx, parent, &parent_inode.id, &listing)?;
            Ok((inode_key, inode))
        })
    }

    /// Load, adjust, and (only when changed) rewrite an inode record.
    fn update_inode_stats(&self, norm: &str, f: impl FnOnce(&mut Stats)) -> FsResult<()> {
        self.with_rw_tx(|tx| {
            let (key, mut inode) = self.find_inode(tx, norm)?;
            let mut stats = inode.to_stats()?;
            f(&mut stats);
            if inode.update(&stats) {
                tx.put(&key, &inode.to_bytes(), true)?;
            }
            Ok(())
        })
    }

    // ---- public operations ------------------------------------------------

    pub fn stat(&self, path: &str) -> FsResult<Stats> {
        let norm = path::normalize(path)?;
        self.with_ro_tx(|tx| {
            let (_, inode) = self.find_inode(tx, &norm)?;
            inode.to_stats()
        })
    }

    pub fn exists(&self, path: &str) -> bool {
        self.stat(path).is_ok()
    }

    pub fn mkdir(&self, path: &str, perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        self.commit_new_node(&norm, FileType::Directory, perm, b"{}")?;
        Ok(())
    }

    pub fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let norm = path::normalize(path)?;
        self.with_ro_tx(|tx| {
            let (_, inode) = self.find_inode(tx, &norm)?;
            let listing = self.dir_listing(tx, &norm, &inode)?;
            Ok(listing.into_keys().collect())
        })
    }

    pub fn unlink(&self, path: &str) -> FsResult<()> {
        self.remove_entry(path, false)
    }

    pub fn rmdir(&self, path: &str) -> FsResult<()> {
        self.remove_entry(path, true)
    }

    /// Shared unlink/rmdir implementation: validates the node type against
    /// the expected kind, deletes blob and inode record, and rewrites the
    /// parent listing, all in one transaction.
    fn remove_entry(&self, path: &str, is_dir: bool) -> FsResult<()> {
        let norm = path::normalize(path)?;
        self.with_rw_tx(|tx| {
            if norm == "/" {
                return Err(FsError::InvalidArgument(norm.clone()));
            }
            let parent = path::dirname(&norm);
            let (_, parent_inode) = self.find_inode(tx, parent)?;
            let mut listing = self.dir_listing(tx, parent, &parent_inode)?;
            let name = path::basename(&norm);
            let Some(key) = listing.remove(name) else {
                return Err(FsError::NotFound(norm.clone()));
            };
            let inode = self.get_inode(tx, &norm, &key)?;
            if is_dir && !inode.is_dir() {
                return Err(FsError::NotADirectory(norm.clone()));
            }
            if !is_dir && inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            if is_dir {
                let children = self.dir_listing(tx, &norm, &inode)?;
                if !children.is_empty() {
                    return Err(FsError::NotEmpty(norm.clone()));
                }
            }
            tx.del(&inode.id)?;
            tx.del(&key)?;
            self.put_listing(tx, parent, &parent_inode.id, &listing)?;
            Ok(())
        })
    }

    /// Move a node. Destinations inside the source subtree are rejected
    /// with EBUSY. An existing destination file is deleted first; an
    /// occupied destination directory entry is reassigned without any
    /// recursive merge of its contents.
    pub fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old = path::normalize(old)?;
        let new = path::normalize(new)?;
        if old == new {
            return Ok(());
        }
        if path::is_within(&old, &new) {
            return Err(FsError::Busy(old));
        }
        self.with_rw_tx(|tx| {
            let old_parent = path::dirname(&old);
            let new_parent = path::dirname(&new);
            let (_, old_parent_inode) = self.find_inode(tx, old_parent)?;
            let mut old_listing = self.dir_listing(tx, old_parent, &old_parent_inode)?;
            let old_name = path::basename(&old);
            let new_name = path::basename(&new);
            let Some(node_key) = old_listing.remove(old_name) else {
                return Err(FsError::NotFound(old.clone()));
            };

            let replace_dest = |tx: &mut Transaction<'_>,
                                listing: &mut HashMap<String, String>|
             -> FsResult<()> {
                if let Some(existing_key) = listing.get(new_name).cloned() {
                    let existing = self.get_inode(tx, &new, &existing_key)?;
                    if existing.is_file() {
                        tx.del(&existing.id)?;
                        tx.del(&existing_key)?;
                    }
                }
                listing.insert(new_name.to_string(), node_key.clone());
                Ok(())
            };

            if old_parent == new_parent {
                replace_dest(tx, &mut old_listing)?;
                self.put_listing(tx, old_parent, &old_parent_inode.id, &old_listing)?;
            } else {
                let (_, new_parent_inode) = self.find_inode(tx, new_parent)?;
                let mut new_listing = self.dir_listing(tx, new_parent, &new_parent_inode)?;
                replace_dest(tx, &mut new_listing)?;
                self.put_listing(tx, old_parent, &old_parent_inode.id, &old_listing)?;
                self.put_listing(tx, new_parent, &new_parent_inode.id, &new_listing)?;
            }
            tracing::debug!(from = %old, to = %new, "rename committed");
            Ok(())
        })
    }

    pub fn chmod(&self, path: &str, perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, |stats| {
            stats.mode = (stats.mode & FileType::MASK) | (perm & !FileType::MASK);
            stats.ctime_ms = now;
        })
    }

    /// The inode record carries no owner fields, so ownership itself is
    /// not persisted; the call validates the path and bumps ctime.
    pub fn chown(&self, path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, |stats| {
            stats.ctime_ms = now;
        })
    }

    pub fn utimes(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, |stats| {
            stats.atime_ms = atime_ms;
            stats.mtime_ms = mtime_ms;
            stats.ctime_ms = now;
        })
    }

    pub fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        let norm = path::normalize(path)?;
        self.with_rw_tx(|tx| {
            let (key, mut inode) = self.find_inode(tx, &norm)?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            let mut data = tx.get(&inode.id)?.ok_or_else(|| FsError::NotFound(norm.clone()))?;
            data.resize(len as usize, 0);
            tx.put(&inode.id, &data, true)?;
            let mut stats = inode.to_stats()?;
            let now = now_ms();
            stats.size = len;
            stats.mtime_ms = now;
            stats.ctime_ms = now;
            if inode.update(&stats) {
                tx.put(&key, &inode.to_bytes(), true)?;
            }
            Ok(())
        })
    }

    pub fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let norm = path::normalize(path)?;
        self.with_ro_tx(|tx| {
            let (_, inode) = self.find_inode(tx, &norm)?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            tx.get(&inode.id)?.ok_or_else(|| FsError::NotFound(norm.clone()))
        })
    }

    pub fn write_file(&self, path: &str, data: &[u8], perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        match self.stat(&norm) {
            Ok(stats) if stats.is_dir() => Err(FsError::IsADirectory(norm)),
            Ok(_) => self.with_rw_tx(|tx| {
                let (key, mut inode) = self.find_inode(tx, &norm)?;
                tx.put(&inode.id, data, true)?;
                let mut stats = inode.to_stats()?;
                let now = now_ms();
                stats.size = data.len() as u64;
                stats.mtime_ms = now;
                stats.ctime_ms = now;
                if inode.update(&stats) {
                    tx.put(&key, &inode.to_bytes(), true)?;
                }
                Ok(())
            }),
            Err(FsError::NotFound(_)) => {
                self.commit_new_node(&norm, FileType::File, perm, data)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ---- open-file handles ------------------------------------------------

    fn allocate_handle_id(&self) -> HandleId {
        let mut next = self.next_handle.lock().unwrap();
        let id = HandleId(*next);
        *next += 1;
        id
    }

    /// Open an existing file, materializing its full content in memory.
    pub fn open(&self, path: &str, mode: OpenMode) -> FsResult<HandleId> {
        let norm = path::normalize(path)?;
        let (inode_key, inode, buffer) = self.with_ro_tx(|tx| {
            let (key, inode) = self.find_inode(tx, &norm)?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            let buffer = tx.get(&inode.id)?.ok_or_else(|| FsError::NotFound(norm.clone()))?;
            Ok((key, inode, buffer))
        })?;
        let stats = inode.to_stats()?;
        let id = self.allocate_handle_id();
        self.handles.lock().unwrap().insert(
            id,
            OpenFile {
                path: norm,
                mode,
                inode_key,
                inode,
                stats,
                buffer,
                dirty: false,
            },
        );
        Ok(id)
    }

    /// Create a new empty file and open it.
    pub fn create(&self, path: &str, perm: u16) -> FsResult<HandleId> {
        let norm = path::normalize(path)?;
        let (inode_key, inode) = self.commit_new_node(&norm, FileType::File, perm, b"")?;
        let stats = inode.to_stats()?;
        let id = self.allocate_handle_id();
        self.handles.lock().unwrap().insert(
            id,
            OpenFile {
                path: norm,
                mode: OpenMode::ReadWrite,
                inode_key,
                inode,
                stats,
                buffer: Vec::new(),
                dirty: false,
            },
        );
        Ok(id)
    }

    pub fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let mut handles = self.handles.lock().unwrap();
        let file = handles.get_mut(&handle).ok_or_else(|| {
            FsError::InvalidArgument(format!("bad handle {}", handle.0))
        })?;
        let start = offset as usize;
        if start >= file.buffer.len() {
            return Ok(0);
        }
        let end = std::cmp::min(start + buf.len(), file.buffer.len());
        buf[..end - start].copy_from_slice(&file.buffer[start..end]);
        file.stats.atime_ms = now_ms();
        Ok(end - start)
    }

    /// Write into the in-memory buffer; nothing reaches the store until
    /// `sync` or `close`.
    pub fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let mut handles = self.handles.lock().unwrap();
        let file = handles.get_mut(&handle).ok_or_else(|| {
            FsError::InvalidArgument(format!("bad handle {}", handle.0))
        })?;
        if file.mode == OpenMode::Read {
            return Err(FsError::AccessDenied(file.path.clone()));
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > file.buffer.len() {
            file.buffer.resize(end, 0);
        }
        file.buffer[start..end].copy_from_slice(data);
        file.dirty = true;
        let now = now_ms();
        file.stats.size = file.buffer.len() as u64;
        file.stats.mtime_ms = now;
        file.stats.ctime_ms = now;
        Ok(data.len())
    }

    pub fn handle_stat(&self, handle: HandleId) -> FsResult<Stats> {
        let handles = self.handles.lock().unwrap();
        let file = handles.get(&handle).ok_or_else(|| {
            FsError::InvalidArgument(format!("bad handle {}", handle.0))
        })?;
        Ok(file.stats)
    }

    /// Persist an open file: the content blob when dirty, and the inode
    /// record only when its stat fields actually changed, both within one
    /// transaction.
    pub fn sync(&self, handle: HandleId) -> FsResult<()> {
        let mut handles = self.handles.lock().unwrap();
        let file = handles.get_mut(&handle).ok_or_else(|| {
            FsError::InvalidArgument(format!("bad handle {}", handle.0))
        })?;
        let was_dirty = file.dirty;
        self.with_rw_tx(|tx| {
            if file.dirty {
                tx.put(&file.inode.id, &file.buffer, true)?;
            }
            if file.inode.update(&file.stats) {
                tx.put(&file.inode_key, &file.inode.to_bytes(), true)?;
            }
            Ok(())
        })?;
        file.dirty = false;
        if was_dirty {
            tracing::debug!(path = %file.path, bytes = file.buffer.len(), "file synced");
        }
        Ok(())
    }

    pub fn close(&self, handle: HandleId) -> FsResult<()> {
        self.sync(handle)?;
        self.handles.lock().unwrap().remove(&handle);
        Ok(())
    }
}

impl<S: KeyValueStore> FileSystem for KeyValueFs<S> {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn is_read_only(&self) -> bool {
        self.store.is_read_only()
    }

    fn stat(&self, path: &str) -> FsResult<Stats> {
        KeyValueFs::stat(self, path)
    }

    fn mkdir(&self, path: &str, perm: u16) -> FsResult<()> {
        KeyValueFs::mkdir(self, path, perm)
    }

    fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        KeyValueFs::readdir(self, path)
    }

    fn unlink(&self, path: &str) -> FsResult<()> {
        KeyValueFs::unlink(self, path)
    }

    fn rmdir(&self, path: &str) -> FsResult<()> {
        KeyValueFs::rmdir(self, path)
    }

    fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        KeyValueFs::rename(self, old, new)
    }

    fn chmod(&self, path: &str, perm: u16) -> FsResult<()> {
        KeyValueFs::chmod(self, path, perm)
    }

    fn chown(&self, path: &str, uid: u32, gid: u32) -> FsResult<()> {
        KeyValueFs::chown(self, path, uid, gid)
    }

    fn utimes(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()> {
        KeyValueFs::utimes(self, path, atime_ms, mtime_ms)
    }

    fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        KeyValueFs::truncate(self, path, len)
    }

    fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        KeyValueFs::read_file(self, path)
    }

    fn write_file(&self, path: &str, data: &[u8], perm: u16) -> FsResult<()> {
        KeyValueFs::write_file(self, path, data, perm)
    }

    fn open(&self, path: &str, mode: OpenMode) -> FsResult<HandleId> {
        KeyValueFs::open(self, path, mode)
    }

    fn create(&self, path: &str, perm: u16) -> FsResult<HandleId> {
        KeyValueFs::create(self, path, perm)
    }

    fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        KeyValueFs::read(self, handle, offset, buf)
    }

    fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        KeyValueFs::write(self, handle, offset, data)
    }

    fn sync(&self, handle: HandleId) -> FsResult<()> {
        KeyValueFs::sync(self, handle)
    }

    fn close(&self, handle: HandleId) -> FsResult<()> {
        KeyValueFs::close(self, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::testing::mock_store::{Behavior, FlakyStore};

    fn new_fs() -> KeyValueFs<InMemoryStore> {
        KeyValueFs::in_memory("test").unwrap()
    }

    #[test]
    fn root_exists_and_is_a_directory() {
        let fs = new_fs();
        let stats = fs.stat("/").unwrap();
        assert!(stats.is_dir());
        assert!(fs.readdir("/").unwrap().is_empty());
    }

    #[test]
    fn reopening_a_store_keeps_the_existing_root() {
        let store = InMemoryStore::new("persistent");
        let fs = KeyValueFs::new(store, Box::new(SequentialIds::new("a"))).unwrap();
        fs.mkdir("/kept", 0o755).unwrap();
        let store = fs.store;
        let fs = KeyValueFs::new(store, Box::new(SequentialIds::new("b"))).unwrap();
        assert!(fs.stat("/kept").unwrap().is_dir());
    }

    #[test]
    fn write_then_read_round_trip() {
        let fs = new_fs();
        fs.write_file("/f.txt", b"hello", 0o644).unwrap();
        assert_eq!(fs.read_file("/f.txt").unwrap(), b"hello");
        assert_eq!(fs.stat("/f.txt").unwrap().size, 5);

        fs.write_file("/f.txt", b"rewritten", 0o644).unwrap();
        assert_eq!(fs.read_file("/f.txt").unwrap(), b"rewritten");
        assert_eq!(fs.stat("/f.txt").unwrap().size, 9);
    }

    #[test]
    fn zero_length_files_round_trip() {
        let fs = new_fs();
        fs.write_file("/empty", b"", 0o644).unwrap();
        assert_eq!(fs.read_file("/empty").unwrap(), Vec::<u8>::new());
        assert_eq!(fs.stat("/empty").unwrap().size, 0);
    }

    #[test]
    fn mkdir_shows_up_in_parent_listing() {
        let fs = new_fs();
        fs.mkdir("/a", 0o755).unwrap();
        assert_eq!(fs.readdir("/").unwrap(), vec!["a".to_string()]);
        fs.rmdir("/a").unwrap();
        assert!(fs.readdir("/").unwrap().is_empty());
    }

    #[test]
    fn mkdir_requires_existing_parent_chain() {
        let fs = new_fs();
        assert!(matches!(fs.mkdir("/a/b", 0o755), Err(FsError::NotFound(_))));
        fs.write_file("/f", b"x", 0o644).unwrap();
        assert!(matches!(
            fs.mkdir("/f/sub", 0o755),
            Err(FsError::NotADirectory(_))
        ));
    }

    #[test]
    fn unlink_is_idempotent_failure_afterwards() {
        let fs = new_fs();
        fs.write_file("/gone", b"x", 0o644).unwrap();
        fs.unlink("/gone").unwrap();
        for _ in 0..3 {
            assert!(matches!(fs.stat("/gone"), Err(FsError::NotFound(_))));
            assert!(matches!(fs.unlink("/gone"), Err(FsError::NotFound(_))));
        }
    }

    #[test]
    fn remove_entry_validates_node_kind() {
        let fs = new_fs();
        fs.mkdir("/d", 0o755).unwrap();
        fs.write_file("/f", b"x", 0o644).unwrap();
        assert!(matches!(fs.unlink("/d"), Err(FsError::IsADirectory(_))));
        assert!(matches!(fs.rmdir("/f"), Err(FsError::NotADirectory(_))));
    }

    #[test]
    fn rmdir_refuses_non_empty_directories() {
        let fs = new_fs();
        fs.mkdir("/d", 0o755).unwrap();
        fs.write_file("/d/f", b"x", 0o644).unwrap();
        assert!(matches!(fs.rmdir("/d"), Err(FsError::NotEmpty(_))));
        fs.unlink("/d/f").unwrap();
        fs.rmdir("/d").unwrap();
    }

    #[test]
    fn rename_scenario_walk() {
        let fs = new_fs();
        fs.mkdir("/a", 0o755).unwrap();
        fs.mkdir("/a/b", 0o755).unwrap();
        fs.write_file("/a/b/c.txt", b"hi", 0o644).unwrap();
        assert_eq!(fs.readdir("/a/b").unwrap(), vec!["c.txt".to_string()]);

        fs.rename("/a/b", "/a/d").unwrap();
        assert_eq!(fs.readdir("/a").unwrap(), vec!["d".to_string()]);
        let stats = fs.stat("/a/d/c.txt").unwrap();
        assert_eq!(stats.size, 2);
        assert!(matches!(fs.stat("/a/b"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn rename_into_own_subtree_is_busy() {
        let fs = new_fs();
        fs.mkdir("/a", 0o755).unwrap();
        assert!(matches!(
            fs.rename("/a", "/a/sub"),
            Err(FsError::Busy(_))
        ));
        // state intact
        assert!(fs.stat("/a").unwrap().is_dir());
        assert!(fs.readdir("/a").unwrap().is_empty());
    }

    #[test]
    fn rename_replaces_destination_file() {
        let fs = new_fs();
        fs.write_file("/src", b"new", 0o644).unwrap();
        fs.write_file("/dst", b"old-content", 0o644).unwrap();
        fs.rename("/src", "/dst").unwrap();
        assert_eq!(fs.read_file("/dst").unwrap(), b"new");
        assert!(matches!(fs.stat("/src"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn rename_sibling_name_is_not_a_descendant() {
        let fs = new_fs();
        fs.mkdir("/a", 0o755).unwrap();
        fs.rename("/a", "/ab").unwrap();
        assert!(fs.stat("/ab").unwrap().is_dir());
    }

    #[test]
    fn chmod_and_utimes_reflected_in_stat() {
        let fs = new_fs();
        fs.write_file("/f", b"x", 0o644).unwrap();
        fs.chmod("/f", 0o600).unwrap();
        let stats = fs.stat("/f").unwrap();
        assert_eq!(stats.perm(), 0o600);
        assert!(stats.is_file());

        fs.utimes("/f", 1111.0, 2222.0).unwrap();
        let stats = fs.stat("/f").unwrap();
        assert_eq!(stats.atime_ms, 1111.0);
        assert_eq!(stats.mtime_ms, 2222.0);
    }

    #[test]
    fn truncate_grows_and_shrinks() {
        let fs = new_fs();
        fs.write_file("/f", b"abcdef", 0o644).unwrap();
        fs.truncate("/f", 3).unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"abc");
        fs.truncate("/f", 5).unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"abc\0\0");
        assert_eq!(fs.stat("/f").unwrap().size, 5);
    }

    #[test]
    fn open_write_sync_close() {
        let fs = new_fs();
        let h = fs.create("/f", 0o644).unwrap();
        assert_eq!(fs.write(h, 0, b"hello ").unwrap(), 6);
        assert_eq!(fs.write(h, 6, b"world").unwrap(), 5);
        // not yet visible through a fresh read before sync
        assert_eq!(fs.read_file("/f").unwrap(), b"");
        fs.close(h).unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"hello world");
        assert_eq!(fs.stat("/f").unwrap().size, 11);

        let h = fs.open("/f", OpenMode::Read).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(h, 6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        fs.close(h).unwrap();
    }

    #[test]
    fn read_only_handles_reject_writes() {
        let fs = new_fs();
        fs.write_file("/f", b"data", 0o644).unwrap();
        let h = fs.open("/f", OpenMode::Read).unwrap();
        assert!(matches!(
            fs.write(h, 0, b"x"),
            Err(FsError::AccessDenied(_))
        ));
        fs.close(h).unwrap();
        assert_eq!(fs.read_file("/f").unwrap(), b"data");
    }

    #[test]
    fn open_directory_is_rejected() {
        let fs = new_fs();
        fs.mkdir("/d", 0o755).unwrap();
        assert!(matches!(
            fs.open("/d", OpenMode::Read),
            Err(FsError::IsADirectory(_))
        ));
        assert!(matches!(
            fs.read_file("/d"),
            Err(FsError::IsADirectory(_))
        ));
    }

    #[test]
    fn id_collisions_are_retried_up_to_the_limit() {
        // 4 collisions then success: node still created.
        let store = FlakyStore::new(InMemoryStore::new("flaky"));
        store.set_behavior(Behavior::CollideFor { count: 4 });
        let fs = KeyValueFs::new(store, Box::new(SequentialIds::new("n"))).unwrap();
        assert!(fs.stat("/").unwrap().is_dir());
    }

    #[test]
    fn exhausting_id_attempts_is_an_io_error() {
        let store = FlakyStore::new(InMemoryStore::new("flaky"));
        let fs = KeyValueFs::new(store, Box::new(SequentialIds::new("n"))).unwrap();
        fs.store().set_behavior(Behavior::CollideFor { count: u64::MAX });
        assert!(matches!(
            fs.write_file("/f", b"x", 0o644),
            Err(FsError::Io { .. })
        ));
        // the failed create aborted cleanly
        assert!(matches!(fs.stat("/f"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn store_failure_mid_create_leaves_no_partial_state() {
        let store = FlakyStore::new(InMemoryStore::new("flaky"));
        let fs = KeyValueFs::new(store, Box::new(SequentialIds::new("n"))).unwrap();
        // First put of the mkdir transaction (the listing blob) fails.
        fs.store().set_behavior(Behavior::FailFor {
            op: "put",
            count: 1,
        });
        assert!(matches!(fs.mkdir("/d", 0o755), Err(FsError::Io { .. })));
        fs.store().set_behavior(Behavior::AlwaysSucceed);
        assert!(matches!(fs.stat("/d"), Err(FsError::NotFound(_))));
        assert!(fs.readdir("/").unwrap().is_empty());
        // and the path is usable afterwards
        fs.mkdir("/d", 0o755).unwrap();
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Overlay filesystem: a writable layer over a read-only one.
//!
//! A path is visible when the writable layer holds it, or the readable
//! layer holds it and no tombstone hides it. Mutations of readable-only
//! entries first copy the entry up into the writable layer; deletions of
//! readable-only entries append a tombstone to a log file kept in the
//! writable layer, so hidden state survives process restarts.
//!
//! The deletion log is append-only and never compacted. Each record is one
//! line, `d<path>` to hide a path or `u<path>` to reveal it again; on
//! replay the latest record for a path wins.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs::{FileSystem, HandleId, OpenMode};
use crate::inode::Stats;
use crate::path;

/// Where the tombstone log lives inside the writable layer. The path is
/// reserved: overlay callers cannot address it through any operation.
pub const DELETION_LOG_PATH: &str = "/.deleted_paths.log";

struct OverlayState {
    /// Tombstoned paths, mapped to a was-a-directory flag. The flag is
    /// known only for tombstones created in this process; replayed entries
    /// carry `false` since the log does not record the node type.
    deleted: HashMap<String, bool>,
    /// Full text of the deletion log, mirrored in memory so appends can be
    /// persisted through whole-file writes.
    log: String,
    initialized: bool,
}

/// Which layer an open handle lives in.
#[derive(Clone, Copy)]
enum HandleLayer {
    Writable,
    Readable,
}

/// A writable filesystem layered over a read-only one, with copy-on-write
/// and persistent deletion tombstones.
pub struct OverlayFs {
    writable: Box<dyn FileSystem>,
    readable: Box<dyn FileSystem>,
    state: Mutex<OverlayState>,
    /// Overlay handle → the layer's own handle. The layers allocate ids
    /// independently, so theirs cannot be handed to callers directly.
    handles: Mutex<HashMap<HandleId, (HandleLayer, HandleId)>>,
    next_handle: Mutex<u64>,
}

impl OverlayFs {
    /// Compose the two layers and replay the deletion log.
    ///
    /// Fails fast with `InvalidArgument` when the writable layer is
    /// read-only or either layer cannot operate synchronously; no partially
    /// constructed overlay is ever returned.
    pub fn new(writable: Box<dyn FileSystem>, readable: Box<dyn FileSystem>) -> FsResult<Self> {
        if writable.is_read_only() {
            return Err(FsError::InvalidArgument(format!(
                "writable layer '{}' is read-only",
                writable.name()
            )));
        }
        if !writable.supports_sync() || !readable.supports_sync() {
            return Err(FsError::InvalidArgument(
                "overlay layers must support synchronous operation".to_string(),
            ));
        }
        let overlay = Self {
            writable,
            readable,
            state: Mutex::new(OverlayState {
                deleted: HashMap::new(),
                log: String::new(),
                initialized: false,
            }),
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
        };
        overlay.initialize()?;
        Ok(overlay)
    }

    /// Replay the deletion log from the writable layer. Idempotent; the
    /// state lock serializes callers, so a second call observes the first
    /// one's completed replay and returns immediately.
    pub fn initialize(&self) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.initialized {
            return Ok(());
        }
        let log = match self.writable.read_file(DELETION_LOG_PATH) {
            Ok(bytes) => String::from_utf8(bytes)
                .map_err(|_| FsError::io(DELETION_LOG_PATH, "deletion log is not UTF-8"))?,
            Err(FsError::NotFound(_)) => String::new(),
            Err(e) => return Err(e),
        };
        let mut deleted = HashMap::new();
        for line in log.lines() {
            let mut chars = line.chars();
            match (chars.next(), chars.as_str()) {
                (Some('d'), p) if p.starts_with('/') => {
                    deleted.insert(p.to_string(), false);
                }
                (Some('u'), p) if p.starts_with('/') => {
                    deleted.remove(p);
                }
                _ => {
                    tracing::warn!(%line, "skipping malformed deletion log record");
                }
            }
        }
        tracing::debug!(tombstones = deleted.len(), "deletion log replayed");
        state.deleted = deleted;
        state.log = log;
        state.initialized = true;
        Ok(())
    }

    fn is_deleted(&self, norm: &str) -> bool {
        self.state.lock().unwrap().deleted.contains_key(norm)
    }

    /// Persist a log record, then apply the in-memory change. Failing to
    /// persist leaves the tombstone set untouched.
    fn append_log(&self, op: char, norm: &str, was_dir: bool) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        let mut log = state.log.clone();
        log.push(op);
        log.push_str(norm);
        log.push('\n');
        self.writable.write_file(DELETION_LOG_PATH, log.as_bytes(), 0o644)?;
        state.log = log;
        match op {
            'd' => {
                state.deleted.insert(norm.to_string(), was_dir);
            }
            _ => {
                state.deleted.remove(norm);
            }
        }
        Ok(())
    }

    /// Tombstone a readable-layer path. The record reaches the writable
    /// layer before this returns, so the deletion survives a crash
    /// immediately afterwards.
    fn delete_path(&self, norm: &str, was_dir: bool) -> FsResult<()> {
        tracing::debug!(path = %norm, was_dir, "tombstoning path");
        self.append_log('d', norm, was_dir)
    }

    /// Drop a tombstone when a path is re-created through the overlay.
    fn un_delete(&self, norm: &str) -> FsResult<()> {
        if self.is_deleted(norm) {
            self.append_log('u', norm, false)?;
        }
        Ok(())
    }

    /// Reject any operation addressing the reserved log path.
    fn checked(&self, raw: &str) -> FsResult<String> {
        let norm = path::normalize(raw)?;
        if norm == DELETION_LOG_PATH {
            return Err(FsError::AccessDenied(norm));
        }
        Ok(norm)
    }

    fn visible(&self, norm: &str) -> bool {
        self.writable.exists(norm) || (!self.is_deleted(norm) && self.readable.exists(norm))
    }

    /// Re-create `norm`'s ancestor chain in the writable layer, carrying
    /// over readable-layer modes where known.
    fn copy_up_parents(&self, norm: &str) -> FsResult<()> {
        let parent = path::dirname(norm);
        if parent == "/" {
            return Ok(());
        }
        let mut prefix = String::new();
        for name in parent[1..].split('/') {
            prefix.push('/');
            prefix.push_str(name);
            if self.writable.exists(&prefix) {
                continue;
            }
            let perm = self.readable.stat(&prefix).map(|s| s.perm()).unwrap_or(0o777);
            self.writable.mkdir(&prefix, perm)?;
        }
        Ok(())
    }

    /// Materialize a readable-only entry into the writable layer.
    fn copy_up(&self, norm: &str) -> FsResult<()> {
        let stats = self.readable.stat(norm)?;
        tracing::debug!(path = %norm, dir = stats.is_dir(), "copying up");
        self.copy_up_parents(norm)?;
        if stats.is_dir() {
            self.writable.mkdir(norm, stats.perm())
        } else {
            let data = self.readable.read_file(norm)?;
            self.writable.write_file(norm, &data, stats.perm())
        }
    }

    /// Route a metadata mutation to the writable layer, copying the entry
    /// up first when only the readable layer holds it.
    fn operate_on_writable(
        &self,
        norm: &str,
        f: impl FnOnce(&dyn FileSystem) -> FsResult<()>,
    ) -> FsResult<()> {
        if !self.visible(norm) {
            return Err(FsError::NotFound(norm.to_string()));
        }
        if !self.writable.exists(norm) {
            self.copy_up(norm)?;
        }
        f(self.writable.as_ref())
    }

    /// Require that the containing directory is visible and a directory.
    fn require_parent_dir(&self, norm: &str) -> FsResult<()> {
        let parent = path::dirname(norm);
        if parent == "/" {
            return Ok(());
        }
        let stats = self.stat(parent)?;
        if !stats.is_dir() {
            return Err(FsError::NotADirectory(parent.to_string()));
        }
        Ok(())
    }

    fn layer_fs(&self, layer: HandleLayer) -> &dyn FileSystem {
        match layer {
            HandleLayer::Writable => self.writable.as_ref(),
            HandleLayer::Readable => self.readable.as_ref(),
        }
    }

    fn track_handle(&self, layer: HandleLayer, inner: HandleId) -> HandleId {
        let mut next = self.next_handle.lock().unwrap();
        let id = HandleId(*next);
        *next += 1;
        self.handles.lock().unwrap().insert(id, (layer, inner));
        id
    }

    fn handle_entry(&self, handle: HandleId) -> FsResult<(HandleLayer, HandleId)> {
        self.handles
            .lock()
            .unwrap()
            .get(&handle)
            .copied()
            .ok_or_else(|| FsError::InvalidArgument(format!("bad handle {}", handle.0)))
    }

    fn rename_file(&self, old: &str, new: &str) -> FsResult<()> {
        if self.writable.exists(old) {
            self.copy_up_parents(new)?;
            self.writable.rename(old, new)?;
        } else {
            let data = self.readable.read_file(old)?;
            let perm = self.readable.stat(old)?.perm();
            self.copy_up_parents(new)?;
            self.writable.write_file(new, &data, perm)?;
        }
        if self.readable.exists(old) {
            self.delete_path(old, false)?;
        }
        self.un_delete(new)
    }

    /// Move a directory one child at a time. There is no whole-subtree
    /// move primitive underneath, so a failure mid-sequence can leave the
    /// tree split between the old and new paths.
    fn rename_dir(&self, old: &str, new: &str) -> FsResult<()> {
        if !self.writable.exists(new) {
            let perm = self.stat(old)?.perm();
            self.copy_up_parents(new)?;
            self.writable.mkdir(new, perm)?;
        }
        self.un_delete(new)?;
        for child in self.readdir(old)? {
            self.rename(&path::join(old, &child), &path::join(new, &child))?;
        }
        if self.writable.exists(old) {
            self.writable.rmdir(old)?;
        }
        if self.readable.exists(old) {
            self.delete_path(old, true)?;
        }
        Ok(())
    }
}

impl FileSystem for OverlayFs {
    fn name(&self) -> &str {
        "overlay"
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn stat(&self, raw: &str) -> FsResult<Stats> {
        let norm = self.checked(raw)?;
        if self.writable.exists(&norm) {
            return self.writable.stat(&norm);
        }
        if !self.is_deleted(&norm) {
            return self.readable.stat(&norm);
        }
        Err(FsError::NotFound(norm))
    }

    fn mkdir(&self, raw: &str, perm: u16) -> FsResult<()> {
        let norm = self.checked(raw)?;
        if self.visible(&norm) {
            return Err(FsError::AlreadyExists(norm));
        }
        self.require_parent_dir(&norm)?;
        self.copy_up_parents(&norm)?;
        self.writable.mkdir(&norm, perm)?;
        self.un_delete(&norm)
    }

    fn readdir(&self, raw: &str) -> FsResult<Vec<String>> {
        let norm = self.checked(raw)?;
        if !self.visible(&norm) {
            return Err(FsError::NotFound(norm));
        }
        let mut names = Vec::new();
        match self.writable.readdir(&norm) {
            Ok(children) => names.extend(children),
            Err(FsError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if !self.is_deleted(&norm) {
            match self.readable.readdir(&norm) {
                Ok(children) => {
                    for child in children {
                        let full = path::join(&norm, &child);
                        if !self.is_deleted(&full) && !names.contains(&child) {
                            names.push(child);
                        }
                    }
                }
                Err(FsError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if norm == "/" {
            names.retain(|n| path::join("/", n) != DELETION_LOG_PATH);
        }
        Ok(names)
    }

    fn unlink(&self, raw: &str) -> FsResult<()> {
        let norm = self.checked(raw)?;
        if !self.visible(&norm) {
            return Err(FsError::NotFound(norm));
        }
        if self.stat(&norm)?.is_dir() {
            return Err(FsError::IsADirectory(norm));
        }
        if self.writable.exists(&norm) {
            self.writable.unlink(&norm)?;
        }
        if self.readable.exists(&norm) {
            self.delete_path(&norm, false)?;
        }
        Ok(())
    }

    fn rmdir(&self, raw: &str) -> FsResult<()> {
        let norm = self.checked(raw)?;
        if !self.visible(&norm) {
            return Err(FsError::NotFound(norm));
        }
        if !self.stat(&norm)?.is_dir() {
            return Err(FsError::NotADirectory(norm));
        }
        if !self.readdir(&norm)?.is_empty() {
            return Err(FsError::NotEmpty(norm));
        }
        if self.writable.exists(&norm) {
            self.writable.rmdir(&norm)?;
        }
        if self.readable.exists(&norm) {
            self.delete_path(&norm, true)?;
        }
        Ok(())
    }

    fn rename(&self, raw_old: &str, raw_new: &str) -> FsResult<()> {
        let old = self.checked(raw_old)?;
        let new = self.checked(raw_new)?;
        if old == new {
            return Ok(());
        }
        if path::is_within(&old, &new) {
            return Err(FsError::Busy(old));
        }
        let old_stats = self.stat(&old)?;
        if old_stats.is_dir() {
            if self.visible(&new) {
                let new_stats = self.stat(&new)?;
                if !new_stats.is_dir() {
                    return Err(FsError::NotADirectory(new));
                }
                if !self.readdir(&new)?.is_empty() {
                    return Err(FsError::NotEmpty(new));
                }
            } else {
                self.require_parent_dir(&new)?;
            }
            self.rename_dir(&old, &new)
        } else {
            if self.visible(&new) {
                if self.stat(&new)?.is_dir() {
                    return Err(FsError::IsADirectory(new));
                }
            } else {
                self.require_parent_dir(&new)?;
            }
            self.rename_file(&old, &new)
        }
    }

    fn chmod(&self, raw: &str, perm: u16) -> FsResult<()> {
        let norm = self.checked(raw)?;
        self.operate_on_writable(&norm, |w| w.chmod(&norm, perm))
    }

    fn chown(&self, raw: &str, uid: u32, gid: u32) -> FsResult<()> {
        let norm = self.checked(raw)?;
        self.operate_on_writable(&norm, |w| w.chown(&norm, uid, gid))
    }

    fn utimes(&self, raw: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()> {
        let norm = self.checked(raw)?;
        self.operate_on_writable(&norm, |w| w.utimes(&norm, atime_ms, mtime_ms))
    }

    fn truncate(&self, raw: &str, len: u64) -> FsResult<()> {
        let norm = self.checked(raw)?;
        self.operate_on_writable(&norm, |w| w.truncate(&norm, len))
    }

    fn read_file(&self, raw: &str) -> FsResult<Vec<u8>> {
        let norm = self.checked(raw)?;
        if self.writable.exists(&norm) {
            return self.writable.read_file(&norm);
        }
        if !self.is_deleted(&norm) && self.readable.exists(&norm) {
            return self.readable.read_file(&norm);
        }
        Err(FsError::NotFound(norm))
    }

    fn write_file(&self, raw: &str, data: &[u8], perm: u16) -> FsResult<()> {
        let norm = self.checked(raw)?;
        if self.visible(&norm) && self.stat(&norm)?.is_dir() {
            return Err(FsError::IsADirectory(norm));
        }
        self.require_parent_dir(&norm)?;
        self.copy_up_parents(&norm)?;
        self.writable.write_file(&norm, data, perm)?;
        self.un_delete(&norm)
    }

    /// Read handles come from whichever layer holds the entry; a
    /// read-write handle forces a copy-up first so every write lands in
    /// the writable layer.
    fn open(&self, raw: &str, mode: OpenMode) -> FsResult<HandleId> {
        let norm = self.checked(raw)?;
        if !self.visible(&norm) {
            return Err(FsError::NotFound(norm));
        }
        let (layer, inner) = match mode {
            OpenMode::ReadWrite => {
                if !self.writable.exists(&norm) {
                    self.copy_up(&norm)?;
                }
                (HandleLayer::Writable, self.writable.open(&norm, mode)?)
            }
            OpenMode::Read => {
                if self.writable.exists(&norm) {
                    (HandleLayer::Writable, self.writable.open(&norm, mode)?)
                } else {
                    (HandleLayer::Readable, self.readable.open(&norm, mode)?)
                }
            }
        };
        Ok(self.track_handle(layer, inner))
    }

    fn create(&self, raw: &str, perm: u16) -> FsResult<HandleId> {
        let norm = self.checked(raw)?;
        if self.visible(&norm) {
            return Err(FsError::AlreadyExists(norm));
        }
        self.require_parent_dir(&norm)?;
        self.copy_up_parents(&norm)?;
        let inner = self.writable.create(&norm, perm)?;
        self.un_delete(&norm)?;
        Ok(self.track_handle(HandleLayer::Writable, inner))
    }

    fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let (layer, inner) = self.handle_entry(handle)?;
        self.layer_fs(layer).read(inner, offset, buf)
    }

    fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let (layer, inner) = self.handle_entry(handle)?;
        self.layer_fs(layer).write(inner, offset, data)
    }

    fn sync(&self, handle: HandleId) -> FsResult<()> {
        let (layer, inner) = self.handle_entry(handle)?;
        self.layer_fs(layer).sync(inner)
    }

    fn close(&self, handle: HandleId) -> FsResult<()> {
        let (layer, inner) = self.handle_entry(handle)?;
        self.layer_fs(layer).close(inner)?;
        self.handles.lock().unwrap().remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::KeyValueFs;

    fn layers() -> (Box<dyn FileSystem>, Box<dyn FileSystem>) {
        let writable = KeyValueFs::in_memory("upper").unwrap();
        let readable = KeyValueFs::in_memory("lower").unwrap();
        readable.mkdir("/docs", 0o755).unwrap();
        readable.write_file("/docs/readme.txt", b"lower", 0o644).unwrap();
        readable.write_file("/base.txt", b"base", 0o644).unwrap();
        (Box::new(writable), Box::new(readable))
    }

    #[test]
    fn readable_entries_show_through() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        assert_eq!(fs.read_file("/docs/readme.txt").unwrap(), b"lower");
        assert!(fs.exists("/base.txt"));
    }

    #[test]
    fn writes_shadow_the_readable_layer() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        fs.write_file("/docs/readme.txt", b"upper", 0o644).unwrap();
        assert_eq!(fs.read_file("/docs/readme.txt").unwrap(), b"upper");
    }

    #[test]
    fn unlink_of_a_readable_entry_tombstones_it() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        fs.unlink("/base.txt").unwrap();
        assert!(!fs.exists("/base.txt"));
        assert!(matches!(fs.read_file("/base.txt"), Err(FsError::NotFound(_))));
    }

    #[test]
    fn recreating_a_tombstoned_path_reveals_it() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        fs.unlink("/base.txt").unwrap();
        fs.write_file("/base.txt", b"again", 0o644).unwrap();
        assert_eq!(fs.read_file("/base.txt").unwrap(), b"again");
    }

    #[test]
    fn log_path_is_unaddressable() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        fs.unlink("/base.txt").unwrap();
        assert!(matches!(
            fs.read_file(DELETION_LOG_PATH),
            Err(FsError::AccessDenied(_))
        ));
        assert!(!fs.readdir("/").unwrap().contains(&".deleted_paths.log".to_string()));
    }

    #[test]
    fn opening_a_readable_entry_for_write_copies_it_up() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        let h = fs.open("/docs/readme.txt", OpenMode::ReadWrite).unwrap();
        assert_eq!(fs.write(h, 0, b"edited").unwrap(), 6);
        fs.close(h).unwrap();
        assert_eq!(fs.read_file("/docs/readme.txt").unwrap(), b"edited");
    }

    #[test]
    fn read_handles_serve_readable_content() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        let h = fs.open("/base.txt", OpenMode::Read).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(fs.read(h, 0, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"base");
        fs.close(h).unwrap();
    }

    #[test]
    fn created_handles_write_to_the_writable_layer() {
        let (w, r) = layers();
        let fs = OverlayFs::new(w, r).unwrap();
        let h = fs.create("/new.txt", 0o644).unwrap();
        fs.write(h, 0, b"fresh").unwrap();
        fs.close(h).unwrap();
        assert_eq!(fs.read_file("/new.txt").unwrap(), b"fresh");
        assert!(matches!(
            fs.create("/new.txt", 0o644),
            Err(FsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn construction_rejects_async_only_layers() {
        struct NoSync;
        impl FileSystem for NoSync {
            fn name(&self) -> &str {
                "nosync"
            }
            fn is_read_only(&self) -> bool {
                false
            }
            fn supports_sync(&self) -> bool {
                false
            }
            fn stat(&self, path: &str) -> FsResult<Stats> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn mkdir(&self, path: &str, _perm: u16) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn unlink(&self, path: &str) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn rmdir(&self, path: &str) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn rename(&self, old: &str, _new: &str) -> FsResult<()> {
                Err(FsError::NotFound(old.to_string()))
            }
            fn chmod(&self, path: &str, _perm: u16) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn chown(&self, path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn utimes(&self, path: &str, _atime_ms: f64, _mtime_ms: f64) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn truncate(&self, path: &str, _len: u64) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn write_file(&self, path: &str, _data: &[u8], _perm: u16) -> FsResult<()> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn open(&self, path: &str, _mode: OpenMode) -> FsResult<HandleId> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn create(&self, path: &str, _perm: u16) -> FsResult<HandleId> {
                Err(FsError::NotFound(path.to_string()))
            }
            fn read(&self, handle: HandleId, _offset: u64, _buf: &mut [u8]) -> FsResult<usize> {
                Err(FsError::InvalidArgument(format!("bad handle {}", handle.0)))
            }
            fn write(&self, handle: HandleId, _offset: u64, _data: &[u8]) -> FsResult<usize> {
                Err(FsError::InvalidArgument(format!("bad handle {}", handle.0)))
            }
            fn sync(&self, handle: HandleId) -> FsResult<()> {
                Err(FsError::InvalidArgument(format!("bad handle {}", handle.0)))
            }
            fn close(&self, handle: HandleId) -> FsResult<()> {
                Err(FsError::InvalidArgument(format!("bad handle {}", handle.0)))
            }
        }

        let writable = Box::new(KeyValueFs::in_memory("upper").unwrap());
        let result = OverlayFs::new(writable, Box::new(NoSync));
        assert!(matches!(result, Err(FsError::InvalidArgument(_))));
    }
}

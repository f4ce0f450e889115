// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Mount-point router over multiple filesystems.
//!
//! Mount points bind path prefixes to filesystems; every call routes to
//! the longest matching prefix with the path rewritten relative to it. A
//! private in-memory filesystem backs the space between mount points: it
//! holds only directories, created automatically when a mount needs its
//! containing chain and pruned again on unmount.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs::{FileSystem, HandleId, OpenMode};
use crate::inode::Stats;
use crate::kv::KeyValueFs;
use crate::path;
use crate::store::InMemoryStore;

enum Target<'a> {
    Root,
    Mount(&'a dyn FileSystem),
}

/// Routes operations across filesystems mounted at disjoint path prefixes.
pub struct MountableFs {
    root: KeyValueFs<InMemoryStore>,
    /// Kept sorted longest-prefix-first so the first match wins.
    mounts: Vec<(String, Box<dyn FileSystem>)>,
    /// Router handle → (owning mount prefix, the mount's own handle).
    /// An empty prefix marks the private root filesystem. Unmounting
    /// invalidates the handles that pointed into the detached mount.
    handles: Mutex<HashMap<HandleId, (String, HandleId)>>,
    next_handle: Mutex<u64>,
}

impl MountableFs {
    pub fn new() -> FsResult<Self> {
        Ok(Self {
            root: KeyValueFs::in_memory("mount-root")?,
            mounts: Vec::new(),
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
        })
    }

    /// Attach `fs` at `at`, creating the mount point directory chain in
    /// the private root filesystem.
    pub fn mount(&mut self, at: &str, fs: Box<dyn FileSystem>) -> FsResult<()> {
        let norm = path::normalize(at)?;
        if norm == "/" {
            return Err(FsError::InvalidArgument(norm));
        }
        if self.mounts.iter().any(|(prefix, _)| *prefix == norm) {
            return Err(FsError::AlreadyExists(norm));
        }
        self.make_root_dirs(&norm)?;
        tracing::debug!(at = %norm, fs = fs.name(), "mounted filesystem");
        self.mounts.push((norm, fs));
        self.mounts.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        Ok(())
    }

    /// Detach the filesystem mounted at `at` and prune any directory in
    /// the private root that exists only to contain it.
    pub fn unmount(&mut self, at: &str) -> FsResult<Box<dyn FileSystem>> {
        let norm = path::normalize(at)?;
        let idx = self
            .mounts
            .iter()
            .position(|(prefix, _)| *prefix == norm)
            .ok_or_else(|| FsError::NotFound(norm.clone()))?;
        let (_, fs) = self.mounts.remove(idx);
        self.prune_root_dirs(&norm);
        tracing::debug!(at = %norm, fs = fs.name(), "unmounted filesystem");
        Ok(fs)
    }

    pub fn mount_points(&self) -> Vec<String> {
        self.mounts.iter().map(|(prefix, _)| prefix.clone()).collect()
    }

    fn make_root_dirs(&self, norm: &str) -> FsResult<()> {
        let mut prefix = String::new();
        for name in norm[1..].split('/') {
            prefix.push('/');
            prefix.push_str(name);
            match self.root.mkdir(&prefix, 0o777) {
                Ok(()) | Err(FsError::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn prune_root_dirs(&self, norm: &str) {
        let mut current = norm.to_string();
        while current != "/" {
            // stops at the first directory still in use
            if self.root.rmdir(&current).is_err() {
                break;
            }
            current = path::dirname(&current).to_string();
        }
    }

    /// Longest-prefix match, with the path rewritten relative to the
    /// mount. Paths under no mount stay on the private root filesystem.
    fn route(&self, raw: &str) -> FsResult<(usize, Target<'_>, String)> {
        let norm = path::normalize(raw)?;
        for (idx, (prefix, fs)) in self.mounts.iter().enumerate() {
            if path::is_within(prefix, &norm) {
                let rel = if norm == *prefix {
                    "/".to_string()
                } else {
                    norm[prefix.len()..].to_string()
                };
                return Ok((idx, Target::Mount(fs.as_ref()), rel));
            }
        }
        Ok((usize::MAX, Target::Root, norm))
    }

    fn target_fs<'a>(&'a self, target: &Target<'a>) -> &'a dyn FileSystem {
        match target {
            Target::Root => &self.root,
            Target::Mount(fs) => *fs,
        }
    }

    fn fs_for_prefix(&self, prefix: &str) -> FsResult<&dyn FileSystem> {
        if prefix.is_empty() {
            return Ok(&self.root);
        }
        self.mounts
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, fs)| fs.as_ref())
            .ok_or_else(|| {
                FsError::InvalidArgument(format!("handle into unmounted filesystem at {prefix}"))
            })
    }

    fn track_handle(&self, prefix: String, inner: HandleId) -> HandleId {
        let mut next = self.next_handle.lock().unwrap();
        let id = HandleId(*next);
        *next += 1;
        self.handles.lock().unwrap().insert(id, (prefix, inner));
        id
    }

    fn handle_entry(&self, handle: HandleId) -> FsResult<(String, HandleId)> {
        self.handles
            .lock()
            .unwrap()
            .get(&handle)
            .cloned()
            .ok_or_else(|| FsError::InvalidArgument(format!("bad handle {}", handle.0)))
    }
}

impl FileSystem for MountableFs {
    fn name(&self) -> &str {
        "mountable"
    }

    fn is_read_only(&self) -> bool {
        false
    }

    fn stat(&self, raw: &str) -> FsResult<Stats> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).stat(&rel)
    }

    fn mkdir(&self, raw: &str, perm: u16) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).mkdir(&rel, perm)
    }

    fn readdir(&self, raw: &str) -> FsResult<Vec<String>> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).readdir(&rel)
    }

    fn unlink(&self, raw: &str) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).unlink(&rel)
    }

    fn rmdir(&self, raw: &str) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).rmdir(&rel)
    }

    /// Within one mount this is the mount's native rename. Across mounts
    /// it degrades to read, write, unlink; directories cannot cross a
    /// mount boundary and fail with the engine's type error.
    fn rename(&self, raw_old: &str, raw_new: &str) -> FsResult<()> {
        let (old_idx, old_target, old_rel) = self.route(raw_old)?;
        let (new_idx, new_target, new_rel) = self.route(raw_new)?;
        let old_fs = self.target_fs(&old_target);
        let new_fs = self.target_fs(&new_target);
        if old_idx == new_idx {
            return old_fs.rename(&old_rel, &new_rel);
        }
        tracing::debug!(old = %raw_old, new = %raw_new, "cross-mount rename");
        let data = old_fs.read_file(&old_rel)?;
        let perm = old_fs.stat(&old_rel)?.perm();
        new_fs.write_file(&new_rel, &data, perm)?;
        old_fs.unlink(&old_rel)
    }

    fn chmod(&self, raw: &str, perm: u16) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).chmod(&rel, perm)
    }

    fn chown(&self, raw: &str, uid: u32, gid: u32) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).chown(&rel, uid, gid)
    }

    fn utimes(&self, raw: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).utimes(&rel, atime_ms, mtime_ms)
    }

    fn truncate(&self, raw: &str, len: u64) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).truncate(&rel, len)
    }

    fn read_file(&self, raw: &str) -> FsResult<Vec<u8>> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).read_file(&rel)
    }

    fn write_file(&self, raw: &str, data: &[u8], perm: u16) -> FsResult<()> {
        let (_, target, rel) = self.route(raw)?;
        self.target_fs(&target).write_file(&rel, data, perm)
    }

    fn open(&self, raw: &str, mode: OpenMode) -> FsResult<HandleId> {
        let (idx, target, rel) = self.route(raw)?;
        let inner = self.target_fs(&target).open(&rel, mode)?;
        let prefix = if idx == usize::MAX {
            String::new()
        } else {
            self.mounts[idx].0.clone()
        };
        Ok(self.track_handle(prefix, inner))
    }

    fn create(&self, raw: &str, perm: u16) -> FsResult<HandleId> {
        let (idx, target, rel) = self.route(raw)?;
        let inner = self.target_fs(&target).create(&rel, perm)?;
        let prefix = if idx == usize::MAX {
            String::new()
        } else {
            self.mounts[idx].0.clone()
        };
        Ok(self.track_handle(prefix, inner))
    }

    fn read(&self, handle: HandleId, offset: u64, buf: &mut [u8]) -> FsResult<usize> {
        let (prefix, inner) = self.handle_entry(handle)?;
        self.fs_for_prefix(&prefix)?.read(inner, offset, buf)
    }

    fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let (prefix, inner) = self.handle_entry(handle)?;
        self.fs_for_prefix(&prefix)?.write(inner, offset, data)
    }

    fn sync(&self, handle: HandleId) -> FsResult<()> {
        let (prefix, inner) = self.handle_entry(handle)?;
        self.fs_for_prefix(&prefix)?.sync(inner)
    }

    fn close(&self, handle: HandleId) -> FsResult<()> {
        let (prefix, inner) = self.handle_entry(handle)?;
        self.fs_for_prefix(&prefix)?.close(inner)?;
        self.handles.lock().unwrap().remove(&handle);
        Ok(())
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Asynchronous key-value filesystem engine.
//!
//! Same semantics as the synchronous engine in the parent module; the only
//! difference is where execution may suspend. Suspension happens solely at
//! store-boundary calls (`get`/`put`/`del`); path walks, listing edits, and
//! stat bookkeeping run to completion in between. Path resolution descends
//! from the root one component at a time, the iterative equivalent of the
//! sync engine's parent-first recursion, with the same O(depth) cost.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::fs::{HandleId, OpenMode};
use crate::ids::IdGenerator;
use crate::inode::{now_ms, FileType, Inode, Stats};
use crate::path;
use crate::store::TransactionMode;
use crate::store_async::{AsyncKeyValueStore, AsyncTransaction};

use super::{MAX_ID_ATTEMPTS, ROOT_KEY};

struct OpenFile {
    path: String,
    mode: OpenMode,
    inode_key: String,
    inode: Inode,
    stats: Stats,
    buffer: Vec<u8>,
    dirty: bool,
}

/// The generic filesystem engine over an asynchronous key-value store.
pub struct AsyncKeyValueFs<S: AsyncKeyValueStore> {
    store: S,
    ids: Box<dyn IdGenerator>,
    handles: Mutex<HashMap<HandleId, OpenFile>>,
    next_handle: Mutex<u64>,
}

impl<S: AsyncKeyValueStore> AsyncKeyValueFs<S> {
    pub async fn new(store: S, ids: Box<dyn IdGenerator>) -> FsResult<Self> {
        let fs = Self {
            store,
            ids,
            handles: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
        };
        fs.make_root_directory().await?;
        Ok(fs)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_read_only(&self) -> bool {
        self.store.is_read_only()
    }

    async fn make_root_directory(&self) -> FsResult<()> {
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = self.make_root_directory_inner(&mut tx).await;
        self.settle(tx, result).await
    }

    async fn make_root_directory_inner(&self, tx: &mut AsyncTransaction<'_>) -> FsResult<()> {
        if tx.get(ROOT_KEY).await?.is_some() {
            return Ok(());
        }
        let blob_key = self.add_new_node(tx, "/", b"{}").await?;
        let inode = Inode::new(blob_key, FileType::Directory, 0o777, 2, now_ms());
        tx.put(ROOT_KEY, &inode.to_bytes(), false).await?;
        Ok(())
    }

    /// Commit on success, abort (restoring pre-images) on failure.
    async fn settle<T>(&self, tx: AsyncTransaction<'_>, result: FsResult<T>) -> FsResult<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::warn!(%abort_err, "abort failed; store may retain partial writes");
                }
                Err(err)
            }
        }
    }

    // ---- node plumbing ----------------------------------------------------

    async fn get_inode(
        &self,
        tx: &AsyncTransaction<'_>,
        path: &str,
        key: &str,
    ) -> FsResult<Inode> {
        let bytes = tx.get(key).await?.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        Inode::from_bytes(&bytes)
    }

    async fn find_inode(
        &self,
        tx: &AsyncTransaction<'_>,
        path: &str,
    ) -> FsResult<(String, Inode)> {
        let mut current_key = ROOT_KEY.to_string();
        let mut current = self.get_inode(tx, "/", ROOT_KEY).await?;
        if path == "/" {
            return Ok((current_key, current));
        }
        let mut so_far = String::new();
        for name in path[1..].split('/') {
            let parent_path = if so_far.is_empty() { "/".to_string() } else { so_far.clone() };
            let listing = self.dir_listing(tx, &parent_path, &current).await?;
            so_far.push('/');
            so_far.push_str(name);
            let key = listing
                .get(name)
                .ok_or_else(|| FsError::NotFound(so_far.clone()))?
                .clone();
            current = self.get_inode(tx, &so_far, &key).await?;
            current_key = key;
        }
        Ok((current_key, current))
    }

    async fn dir_listing(
        &self,
        tx: &AsyncTransaction<'_>,
        path: &str,
        inode: &Inode,
    ) -> FsResult<HashMap<String, String>> {
        if !inode.is_dir() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        let blob = tx.get(&inode.id).await?.ok_or_else(|| FsError::NotFound(path.to_string()))?;
        serde_json::from_slice(&blob).map_err(|e| FsError::io(path, e.to_string()))
    }

    async fn put_listing(
        &self,
        tx: &mut AsyncTransaction<'_>,
        path: &str,
        blob_key: &str,
        listing: &HashMap<String, String>,
    ) -> FsResult<()> {
        let bytes = serde_json::to_vec(listing).map_err(|e| FsError::io(path, e.to_string()))?;
        tx.put(blob_key, &bytes, true).await?;
        Ok(())
    }

    async fn add_new_node(
        &self,
        tx: &mut AsyncTransaction<'_>,
        path: &str,
        data: &[u8],
    ) -> FsResult<String> {
        for attempt in 0..MAX_ID_ATTEMPTS {
            let key = self.ids.generate();
            if tx.put(&key, data, false).await? {
                return Ok(key);
            }
            tracing::warn!(%path, attempt, "generated store key collided; retrying");
        }
        Err(FsError::io(path, "unable to allocate a unique store key"))
    }

    async fn commit_new_node(
        &self,
        norm: &str,
        file_type: FileType,
        perm: u16,
        data: &[u8],
    ) -> FsResult<(String, Inode)> {
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = self.commit_new_node_inner(&mut tx, norm, file_type, perm, data).await;
        self.settle(tx, result).await
    }

    async fn commit_new_node_inner(
        &self,
        tx: &mut AsyncTransaction<'_>,
        norm: &str,
        file_type: FileType,
        perm: u16,
        data: &[u8],
    ) -> FsResult<(String, Inode)> {
        if norm == "/" {
            return Err(FsError::AlreadyExists(norm.to_string()));
        }
        let parent = path::dirname(norm);
        let (_, parent_inode) = self.find_inode(tx, parent).await?;
        let mut listing = self.dir_listing(tx, parent, &parent_inode).await?;
        let name = path::basename(norm);
        if listing.contains_key(name) {
            return Err(FsError::AlreadyExists(norm.to_string()));
        }
        let blob_key = self.add_new_node(tx, norm, data).await?;
        let inode = Inode::new(blob_key, file_type, perm, data.len() as u32, now_ms());
        let inode_key = self.add_new_node(tx, norm, &inode.to_bytes()).await?;
        listing.insert(name.to_string(), inode_key.clone());
        self.put_listing(tx, parent, &parent_inode.id, &listing).await?;
        Ok((inode_key, inode))
    }

    async fn update_inode_stats(
        &self,
        norm: &str,
        f: impl FnOnce(&mut Stats) + Send,
    ) -> FsResult<()> {
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = async {
            let (key, mut inode) = self.find_inode(&tx, norm).await?;
            let mut stats = inode.to_stats()?;
            f(&mut stats);
            if inode.update(&stats) {
                tx.put(&key, &inode.to_bytes(), true).await?;
            }
            Ok(())
        }
        .await;
        self.settle(tx, result).await
    }

    // ---- public operations ------------------------------------------------

    pub async fn stat(&self, path: &str) -> FsResult<Stats> {
        let norm = path::normalize(path)?;
        let tx = AsyncTransaction::new(&self.store, TransactionMode::ReadOnly);
        let result = async {
            let (_, inode) = self.find_inode(&tx, &norm).await?;
            inode.to_stats()
        }
        .await;
        self.settle(tx, result).await
    }

    pub async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    pub async fn mkdir(&self, path: &str, perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        self.commit_new_node(&norm, FileType::Directory, perm, b"{}").await?;
        Ok(())
    }

    pub async fn readdir(&self, path: &str) -> FsResult<Vec<String>> {
        let norm = path::normalize(path)?;
        let tx = AsyncTransaction::new(&self.store, TransactionMode::ReadOnly);
        let result = async {
            let (_, inode) = self.find_inode(&tx, &norm).await?;
            let listing = self.dir_listing(&tx, &norm, &inode).await?;
            Ok(listing.into_keys().collect())
        }
        .await;
        self.settle(tx, result).await
    }

    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        self.remove_entry(path, false).await
    }

    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        self.remove_entry(path, true).await
    }

    async fn remove_entry(&self, path: &str, is_dir: bool) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = self.remove_entry_inner(&mut tx, &norm, is_dir).await;
        self.settle(tx, result).await
    }

    async fn remove_entry_inner(
        &self,
        tx: &mut AsyncTransaction<'_>,
        norm: &str,
        is_dir: bool,
    ) -> FsResult<()> {
        if norm == "/" {
            return Err(FsError::InvalidArgument(norm.to_string()));
        }
        let parent = path::dirname(norm);
        let (_, parent_inode) = self.find_inode(tx, parent).await?;
        let mut listing = self.dir_listing(tx, parent, &parent_inode).await?;
        let name = path::basename(norm);
        let Some(key) = listing.remove(name) else {
            return Err(FsError::NotFound(norm.to_string()));
        };
        let inode = self.get_inode(tx, norm, &key).await?;
        if is_dir && !inode.is_dir() {
            return Err(FsError::NotADirectory(norm.to_string()));
        }
        if !is_dir && inode.is_dir() {
            return Err(FsError::IsADirectory(norm.to_string()));
        }
        if is_dir {
            let children = self.dir_listing(tx, norm, &inode).await?;
            if !children.is_empty() {
                return Err(FsError::NotEmpty(norm.to_string()));
            }
        }
        tx.del(&inode.id).await?;
        tx.del(&key).await?;
        self.put_listing(tx, parent, &parent_inode.id, &listing).await?;
        Ok(())
    }

    pub async fn rename(&self, old: &str, new: &str) -> FsResult<()> {
        let old = path::normalize(old)?;
        let new = path::normalize(new)?;
        if old == new {
            return Ok(());
        }
        if path::is_within(&old, &new) {
            return Err(FsError::Busy(old));
        }
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = self.rename_inner(&mut tx, &old, &new).await;
        self.settle(tx, result).await
    }

    async fn rename_inner(
        &self,
        tx: &mut AsyncTransaction<'_>,
        old: &str,
        new: &str,
    ) -> FsResult<()> {
        let old_parent = path::dirname(old);
        let new_parent = path::dirname(new);
        let (_, old_parent_inode) = self.find_inode(tx, old_parent).await?;
        let mut old_listing = self.dir_listing(tx, old_parent, &old_parent_inode).await?;
        let old_name = path::basename(old);
        let new_name = path::basename(new);
        let Some(node_key) = old_listing.remove(old_name) else {
            return Err(FsError::NotFound(old.to_string()));
        };

        if old_parent == new_parent {
            if let Some(existing_key) = old_listing.get(new_name).cloned() {
                let existing = self.get_inode(tx, new, &existing_key).await?;
                if existing.is_file() {
                    tx.del(&existing.id).await?;
                    tx.del(&existing_key).await?;
                }
            }
            old_listing.insert(new_name.to_string(), node_key);
            self.put_listing(tx, old_parent, &old_parent_inode.id, &old_listing).await?;
        } else {
            let (_, new_parent_inode) = self.find_inode(tx, new_parent).await?;
            let mut new_listing = self.dir_listing(tx, new_parent, &new_parent_inode).await?;
            if let Some(existing_key) = new_listing.get(new_name).cloned() {
                let existing = self.get_inode(tx, new, &existing_key).await?;
                if existing.is_file() {
                    tx.del(&existing.id).await?;
                    tx.del(&existing_key).await?;
                }
            }
            new_listing.insert(new_name.to_string(), node_key);
            self.put_listing(tx, old_parent, &old_parent_inode.id, &old_listing).await?;
            self.put_listing(tx, new_parent, &new_parent_inode.id, &new_listing).await?;
        }
        Ok(())
    }

    pub async fn chmod(&self, path: &str, perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, move |stats| {
            stats.mode = (stats.mode & FileType::MASK) | (perm & !FileType::MASK);
            stats.ctime_ms = now;
        })
        .await
    }

    pub async fn chown(&self, path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, move |stats| {
            stats.ctime_ms = now;
        })
        .await
    }

    pub async fn utimes(&self, path: &str, atime_ms: f64, mtime_ms: f64) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let now = now_ms();
        self.update_inode_stats(&norm, move |stats| {
            stats.atime_ms = atime_ms;
            stats.mtime_ms = mtime_ms;
            stats.ctime_ms = now;
        })
        .await
    }

    pub async fn truncate(&self, path: &str, len: u64) -> FsResult<()> {
        let norm = path::normalize(path)?;
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = async {
            let (key, mut inode) = self.find_inode(&tx, &norm).await?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            let mut data =
                tx.get(&inode.id).await?.ok_or_else(|| FsError::NotFound(norm.clone()))?;
            data.resize(len as usize, 0);
            tx.put(&inode.id, &data, true).await?;
            let mut stats = inode.to_stats()?;
            let now = now_ms();
            stats.size = len;
            stats.mtime_ms = now;
            stats.ctime_ms = now;
            if inode.update(&stats) {
                tx.put(&key, &inode.to_bytes(), true).await?;
            }
            Ok(())
        }
        .await;
        self.settle(tx, result).await
    }

    pub async fn read_file(&self, path: &str) -> FsResult<Vec<u8>> {
        let norm = path::normalize(path)?;
        let tx = AsyncTransaction::new(&self.store, TransactionMode::ReadOnly);
        let result = async {
            let (_, inode) = self.find_inode(&tx, &norm).await?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            tx.get(&inode.id).await?.ok_or_else(|| FsError::NotFound(norm.clone()))
        }
        .await;
        self.settle(tx, result).await
    }

    pub async fn write_file(&self, path: &str, data: &[u8], perm: u16) -> FsResult<()> {
        let norm = path::normalize(path)?;
        match self.stat(&norm).await {
            Ok(stats) if stats.is_dir() => Err(FsError::IsADirectory(norm)),
            Ok(_) => {
                let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
                let result = async {
                    let (key, mut inode) = self.find_inode(&tx, &norm).await?;
                    tx.put(&inode.id, data, true).await?;
                    let mut stats = inode.to_stats()?;
                    let now = now_ms();
                    stats.size = data.len() as u64;
                    stats.mtime_ms = now;
                    stats.ctime_ms = now;
                    if inode.update(&stats) {
                        tx.put(&key, &inode.to_bytes(), true).await?;
                    }
                    Ok(())
                }
                .await;
                self.settle(tx, result).await
            }
            Err(FsError::NotFound(_)) => {
                self.commit_new_node(&norm, FileType::File, perm, data).await?;
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

    pub async fn open(&self, path: &str, mode: OpenMode) -> FsResult<HandleId> {
        let norm = path::normalize(path)?;
        let tx = AsyncTransaction::new(&self.store, TransactionMode::ReadOnly);
        let result = async {
            let (key, inode) = self.find_inode(&tx, &norm).await?;
            if inode.is_dir() {
                return Err(FsError::IsADirectory(norm.clone()));
            }
            let buffer = tx.get(&inode.id).await?.ok_or_else(|| FsError::NotFound(norm.clone()))?;
            Ok((key, inode, buffer))
        }
        .await;
        let (inode_key, inode, buffer) = self.settle(tx, result).await?;
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

    pub async fn create(&self, path: &str, perm: u16) -> FsResult<HandleId> {
        let norm = path::normalize(path)?;
        let (inode_key, inode) = self.commit_new_node(&norm, FileType::File, perm, b"").await?;
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
        let file = handles
            .get_mut(&handle)
            .ok_or_else(|| FsError::InvalidArgument(format!("bad handle {}", handle.0)))?;
        let start = offset as usize;
        if start >= file.buffer.len() {
            return Ok(0);
        }
        let end = std::cmp::min(start + buf.len(), file.buffer.len());
        buf[..end - start].copy_from_slice(&file.buffer[start..end]);
        file.stats.atime_ms = now_ms();
        Ok(end - start)
    }

    pub fn write(&self, handle: HandleId, offset: u64, data: &[u8]) -> FsResult<usize> {
        let mut handles = self.handles.lock().unwrap();
        let file = handles
            .get_mut(&handle)
            .ok_or_else(|| FsError::InvalidArgument(format!("bad handle {}", handle.0)))?;
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

    pub async fn sync(&self, handle: HandleId) -> FsResult<()> {
        // take the open file out so no lock is held across store awaits
        let mut file = {
            let mut handles = self.handles.lock().unwrap();
            handles
                .remove(&handle)
                .ok_or_else(|| FsError::InvalidArgument(format!("bad handle {}", handle.0)))?
        };
        let mut tx = AsyncTransaction::new(&self.store, TransactionMode::ReadWrite);
        let result = async {
            if file.dirty {
                tx.put(&file.inode.id, &file.buffer, true).await?;
            }
            if file.inode.update(&file.stats) {
                tx.put(&file.inode_key, &file.inode.to_bytes(), true).await?;
            }
            Ok(())
        }
        .await;
        let outcome = self.settle(tx, result).await;
        if outcome.is_ok() {
            tracing::debug!(path = %file.path, bytes = file.buffer.len(), "file synced");
            file.dirty = false;
        }
        self.handles.lock().unwrap().insert(handle, file);
        outcome
    }

    pub async fn close(&self, handle: HandleId) -> FsResult<()> {
        self.sync(handle).await?;
        self.handles.lock().unwrap().remove(&handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::store_async::AsyncInMemoryStore;

    async fn new_fs() -> AsyncKeyValueFs<AsyncInMemoryStore> {
        AsyncKeyValueFs::new(
            AsyncInMemoryStore::default(),
            Box::new(SequentialIds::new("n")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let fs = new_fs().await;
        fs.write_file("/f", b"payload", 0o644).await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"payload");
        assert_eq!(fs.stat("/f").await.unwrap().size, 7);
    }

    #[tokio::test]
    async fn directory_lifecycle() {
        let fs = new_fs().await;
        fs.mkdir("/a", 0o755).await.unwrap();
        fs.mkdir("/a/b", 0o755).await.unwrap();
        fs.write_file("/a/b/c.txt", b"hi", 0o644).await.unwrap();
        assert_eq!(fs.readdir("/a/b").await.unwrap(), vec!["c.txt".to_string()]);

        fs.rename("/a/b", "/a/d").await.unwrap();
        assert_eq!(fs.readdir("/a").await.unwrap(), vec!["d".to_string()]);
        assert_eq!(fs.stat("/a/d/c.txt").await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn rename_cycle_is_rejected() {
        let fs = new_fs().await;
        fs.mkdir("/a", 0o755).await.unwrap();
        assert!(matches!(
            fs.rename("/a", "/a/sub").await,
            Err(FsError::Busy(_))
        ));
    }

    #[tokio::test]
    async fn unlink_then_stat_is_not_found() {
        let fs = new_fs().await;
        fs.write_file("/f", b"x", 0o644).await.unwrap();
        fs.unlink("/f").await.unwrap();
        assert!(matches!(fs.stat("/f").await, Err(FsError::NotFound(_))));
        assert!(matches!(fs.unlink("/f").await, Err(FsError::NotFound(_))));
    }

    #[tokio::test]
    async fn handles_buffer_until_sync() {
        let fs = new_fs().await;
        let h = fs.create("/f", 0o644).await.unwrap();
        fs.write(h, 0, b"abc").unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"");
        fs.close(h).await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn read_only_handles_reject_writes() {
        let fs = new_fs().await;
        fs.write_file("/f", b"data", 0o644).await.unwrap();
        let h = fs.open("/f", OpenMode::Read).await.unwrap();
        assert!(matches!(
            fs.write(h, 0, b"x"),
            Err(FsError::AccessDenied(_))
        ));
        fs.close(h).await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"data");
    }

    #[tokio::test]
    async fn chmod_and_truncate() {
        let fs = new_fs().await;
        fs.write_file("/f", b"abcdef", 0o644).await.unwrap();
        fs.chmod("/f", 0o600).await.unwrap();
        assert_eq!(fs.stat("/f").await.unwrap().perm(), 0o600);
        fs.truncate("/f", 2).await.unwrap();
        assert_eq!(fs.read_file("/f").await.unwrap(), b"ab");
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Synchronous key-value store contract and the snapshot/rollback
//! transaction layered on top of it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::{FsError, FsResult};

/// Transaction isolation intent, declared up front by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// Flat, opaque, string-keyed byte storage. The engine is agnostic to what
/// actually backs this: an in-memory map, browser storage, an object store.
///
/// `put` with `overwrite = false` is the insert-if-absent primitive the
/// engine builds unique key allocation on: it returns `Ok(false)` when the
/// key already exists, without touching the stored value.
pub trait KeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    fn is_read_only(&self) -> bool {
        false
    }

    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool>;

    fn del(&self, key: &str) -> FsResult<()>;
}

/// Lets callers share one store between several filesystem instances, e.g.
/// reopening an overlay's writable layer over data written earlier.
impl<S: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        (**self).put(key, value, overwrite)
    }

    fn del(&self, key: &str) -> FsResult<()> {
        (**self).del(key)
    }
}

/// Scopes a sequence of store operations so they commit all-or-nothing.
///
/// The underlying store has no native rollback, so the transaction records
/// each key's pre-mutation value the first time it is written and, on
/// abort, replays those snapshots in reverse order.
pub struct Transaction<'a> {
    store: &'a dyn KeyValueStore,
    mode: TransactionMode,
    undo: Vec<(String, Option<Vec<u8>>)>,
    touched: HashSet<String>,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a dyn KeyValueStore, mode: TransactionMode) -> Self {
        Self {
            store,
            mode,
            undo: Vec::new(),
            touched: HashSet::new(),
            finished: false,
        }
    }

    pub fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        self.store.get(key)
    }

    pub fn put(&mut self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        self.snapshot(key)?;
        self.store.put(key, value, overwrite)
    }

    pub fn del(&mut self, key: &str) -> FsResult<()> {
        self.snapshot(key)?;
        self.store.del(key)
    }

    /// Record `key`'s current value before its first mutation in this
    /// transaction.
    fn snapshot(&mut self, key: &str) -> FsResult<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(FsError::AccessDenied(key.to_string()));
        }
        if self.touched.insert(key.to_string()) {
            let previous = self.store.get(key)?;
            self.undo.push((key.to_string(), previous));
        }
        Ok(())
    }

    /// All operations already applied directly to the store; committing
    /// just discards the undo log.
    pub fn commit(mut self) -> FsResult<()> {
        self.finished = true;
        tracing::debug!(store = self.store.name(), keys = self.touched.len(), "commit");
        Ok(())
    }

    /// Restore every mutated key to its pre-transaction value, newest
    /// mutation first.
    pub fn abort(mut self) -> FsResult<()> {
        self.finished = true;
        tracing::debug!(store = self.store.name(), keys = self.undo.len(), "abort");
        for (key, previous) in self.undo.drain(..).rev() {
            match previous {
                Some(value) => {
                    self.store.put(&key, &value, true)?;
                }
                None => self.store.del(&key)?,
            }
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.finished && !self.undo.is_empty() {
            tracing::warn!(
                store = self.store.name(),
                keys = self.undo.len(),
                "transaction dropped without commit or abort; rolling back"
            );
            for (key, previous) in std::mem::take(&mut self.undo).into_iter().rev() {
                let result = match previous {
                    Some(value) => self.store.put(&key, &value, true).map(|_| ()),
                    None => self.store.del(&key),
                };
                if let Err(err) = result {
                    tracing::warn!(%key, %err, "rollback failed during drop");
                }
            }
        }
    }
}

/// In-memory store backend. The reference implementation of the contract
/// and the substrate for the mount router's private root filesystem.
pub struct InMemoryStore {
    name: String,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl KeyValueStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        let mut data = self.data.lock().unwrap();
        if !overwrite && data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    fn del(&self, key: &str) -> FsResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

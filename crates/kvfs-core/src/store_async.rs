// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Asynchronous key-value store contract.
//!
//! Mirrors the synchronous contract in `store.rs`; the only difference is
//! where execution may suspend. Suspension points occur exclusively at
//! these store-boundary calls, never mid-computation, so the engine's
//! transaction semantics are identical in both variants.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{FsError, FsResult};
use crate::store::TransactionMode;

/// Async variant of the flat key-value storage contract.
#[async_trait]
pub trait AsyncKeyValueStore: Send + Sync {
    fn name(&self) -> &str;

    fn is_read_only(&self) -> bool {
        false
    }

    async fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>>;

    /// Insert-if-absent when `overwrite` is false; `Ok(false)` signals an
    /// existing key, with the stored value left untouched.
    async fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool>;

    async fn del(&self, key: &str) -> FsResult<()>;
}

/// Snapshot/rollback transaction over an async store.
///
/// Unlike the sync variant there is no drop-time rollback (dropping cannot
/// await); the engine always settles a transaction with an explicit
/// `commit` or `abort`.
pub struct AsyncTransaction<'a> {
    store: &'a dyn AsyncKeyValueStore,
    mode: TransactionMode,
    undo: Vec<(String, Option<Vec<u8>>)>,
    touched: HashSet<String>,
}

impl<'a> AsyncTransaction<'a> {
    pub fn new(store: &'a dyn AsyncKeyValueStore, mode: TransactionMode) -> Self {
        Self {
            store,
            mode,
            undo: Vec::new(),
            touched: HashSet::new(),
        }
    }

    pub async fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        self.store.get(key).await
    }

    pub async fn put(&mut self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        self.snapshot(key).await?;
        self.store.put(key, value, overwrite).await
    }

    pub async fn del(&mut self, key: &str) -> FsResult<()> {
        self.snapshot(key).await?;
        self.store.del(key).await
    }

    async fn snapshot(&mut self, key: &str) -> FsResult<()> {
        if self.mode == TransactionMode::ReadOnly {
            return Err(FsError::AccessDenied(key.to_string()));
        }
        if self.touched.insert(key.to_string()) {
            let previous = self.store.get(key).await?;
            self.undo.push((key.to_string(), previous));
        }
        Ok(())
    }

    pub async fn commit(self) -> FsResult<()> {
        tracing::debug!(store = self.store.name(), keys = self.touched.len(), "commit");
        Ok(())
    }

    pub async fn abort(mut self) -> FsResult<()> {
        tracing::debug!(store = self.store.name(), keys = self.undo.len(), "abort");
        for (key, previous) in self.undo.drain(..).rev() {
            match previous {
                Some(value) => {
                    self.store.put(&key, &value, true).await?;
                }
                None => self.store.del(&key).await?,
            }
        }
        Ok(())
    }
}

/// In-memory async backend, used by the async engine's tests.
pub struct AsyncInMemoryStore {
    name: String,
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl AsyncInMemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for AsyncInMemoryStore {
    fn default() -> Self {
        Self::new("async-in-memory")
    }
}

#[async_trait]
impl AsyncKeyValueStore for AsyncInMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        let mut data = self.data.lock().unwrap();
        if !overwrite && data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn del(&self, key: &str) -> FsResult<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Fault-injecting key-value store for testing retry and abort paths.
//!
//! `FlakyStore` is a decorator over any real `KeyValueStore`: operations
//! delegate to the inner store unless the configured behavior says to
//! report a collision or fail outright.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{FsError, FsResult};
use crate::store::KeyValueStore;

/// Failure policy applied to delegated operations.
#[derive(Clone, Copy, Debug)]
pub enum Behavior {
    /// Delegate everything untouched.
    AlwaysSucceed,
    /// Report a key collision (`put` with `overwrite = false` returns
    /// `Ok(false)` without writing) for the first `count` such calls.
    CollideFor { count: u64 },
    /// Fail the named operation (`"get"`, `"put"`, `"del"`) with an i/o
    /// error for its first `count` invocations.
    FailFor { op: &'static str, count: u64 },
    /// Fail the named operation on every invocation.
    AlwaysFail { op: &'static str },
}

pub struct FlakyStore<S: KeyValueStore> {
    inner: S,
    behavior: Mutex<Behavior>,
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl<S: KeyValueStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            behavior: Mutex::new(Behavior::AlwaysSucceed),
            counts: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
        self.counts.lock().unwrap().clear();
    }

    pub fn call_count(&self, op: &'static str) -> u64 {
        self.counts.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Bump the per-op counter and decide whether this call fails.
    fn check_fault(&self, op: &'static str, key: &str) -> FsResult<()> {
        let count = {
            let mut counts = self.counts.lock().unwrap();
            let entry = counts.entry(op).or_insert(0);
            let current = *entry;
            *entry += 1;
            current
        };
        match *self.behavior.lock().unwrap() {
            Behavior::FailFor { op: target, count: limit } if op == target && count < limit => {
                Err(FsError::io(key, "injected store failure"))
            }
            Behavior::AlwaysFail { op: target } if op == target => {
                Err(FsError::io(key, "injected store failure"))
            }
            _ => Ok(()),
        }
    }

    /// Whether this insert-if-absent call should report a collision.
    fn check_collision(&self) -> bool {
        let mut counts = self.counts.lock().unwrap();
        let entry = counts.entry("collide").or_insert(0);
        match *self.behavior.lock().unwrap() {
            Behavior::CollideFor { count } if *entry < count => {
                *entry += 1;
                true
            }
            _ => false,
        }
    }
}

impl<S: KeyValueStore> KeyValueStore for FlakyStore<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &str) -> FsResult<Option<Vec<u8>>> {
        self.check_fault("get", key)?;
        self.inner.get(key)
    }

    fn put(&self, key: &str, value: &[u8], overwrite: bool) -> FsResult<bool> {
        self.check_fault("put", key)?;
        if !overwrite && self.check_collision() {
            return Ok(false);
        }
        self.inner.put(key, value, overwrite)
    }

    fn del(&self, key: &str) -> FsResult<()> {
        self.check_fault("del", key)?;
        self.inner.del(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn collide_for_reports_then_succeeds() {
        let store = FlakyStore::new(InMemoryStore::default());
        store.set_behavior(Behavior::CollideFor { count: 2 });
        assert!(!store.put("k", b"v", false).unwrap());
        assert!(!store.put("k", b"v", false).unwrap());
        assert!(store.put("k", b"v", false).unwrap());
        // overwriting puts are never treated as collisions
        assert!(store.put("k", b"w", true).unwrap());
    }

    #[test]
    fn fail_for_counts_per_operation() {
        let store = FlakyStore::new(InMemoryStore::default());
        store.set_behavior(Behavior::FailFor { op: "put", count: 1 });
        assert!(store.put("k", b"v", true).is_err());
        assert!(store.put("k", b"v", true).is_ok());
        assert!(store.get("k").unwrap().is_some());
        assert_eq!(store.call_count("put"), 2);
    }
}

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Opaque key generation for inode records and content blobs.
//!
//! The store offers no unique-create primitive beyond insert-if-absent, so
//! node allocation generates a random key and retries on collision. The
//! generator sits behind a trait so tests can substitute a deterministic
//! sequence (or force collisions).

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of opaque store keys.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Production generator: random UUIDv4 keys.
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic generator for tests: `prefix-0`, `prefix-1`, ...
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{}-{}", self.prefix, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_are_distinct() {
        let ids = UuidIds;
        assert_ne!(ids.generate(), ids.generate());
    }

    #[test]
    fn sequential_ids_are_deterministic() {
        let ids = SequentialIds::new("node");
        assert_eq!(ids.generate(), "node-0");
        assert_eq!(ids.generate(), "node-1");
    }
}

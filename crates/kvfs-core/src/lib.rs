// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! kvfs — POSIX-like filesystems over flat key-value storage
//!
//! This crate emulates a hierarchical filesystem (files, directories,
//! stat metadata) on top of any opaque string-keyed byte store, and
//! composes such filesystems into overlay and mount-point namespaces.
//! Storage backends plug in through the [`store::KeyValueStore`] and
//! [`store_async::AsyncKeyValueStore`] traits.

pub mod error;
pub mod fs;
pub mod ids;
pub mod inode;
pub mod kv;
pub mod mount;
pub mod overlay;
pub mod path;
pub mod store;
pub mod store_async;
pub mod testing;

// Re-export key types
pub use error::{FsError, FsResult};
pub use fs::{FileSystem, HandleId, OpenMode};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use inode::{FileType, Inode, Stats};
pub use kv::async_fs::AsyncKeyValueFs;
pub use kv::KeyValueFs;
pub use mount::MountableFs;
pub use overlay::OverlayFs;
pub use store::{InMemoryStore, KeyValueStore, Transaction, TransactionMode};
pub use store_async::{AsyncInMemoryStore, AsyncKeyValueStore, AsyncTransaction};

// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Absolute-path helpers shared by the engines.
//!
//! All paths handled by the engines are absolute, `/`-separated strings.
//! Normalization happens once at the public API boundary; internal code can
//! then rely on `dirname`/`basename` splitting without re-checking.

use crate::error::{FsError, FsResult};

/// Normalize a caller-supplied path: require a leading `/`, collapse
/// duplicate separators, and strip any trailing `/` (except for the root).
/// `.` and `..` components are rejected rather than resolved; the engines
/// have no notion of a working directory.
pub fn normalize(path: &str) -> FsResult<String> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument(path.to_string()));
    }
    let mut out = String::with_capacity(path.len());
    for component in path.split('/') {
        match component {
            "" => {}
            "." | ".." => return Err(FsError::InvalidArgument(path.to_string())),
            name => {
                out.push('/');
                out.push_str(name);
            }
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    Ok(out)
}

/// Parent directory of a normalized path. The parent of `/` is `/`.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

/// Final component of a normalized path. The basename of `/` is `""`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Join a normalized directory path with a child name.
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Whether `candidate` is `ancestor` itself or lies underneath it.
pub fn is_within(ancestor: &str, candidate: &str) -> bool {
    candidate == ancestor
        || (ancestor == "/" && candidate.starts_with('/'))
        || candidate.starts_with(&format!("{ancestor}/"))
}

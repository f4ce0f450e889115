// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the kvfs engine

/// Core filesystem error type. Every variant carries the offending path so
/// callers can report which entry a failed operation was addressing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("file exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("resource busy or locked: {0}")]
    Busy(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl FsError {
    /// The path the failed operation was addressing.
    pub fn path(&self) -> &str {
        match self {
            FsError::NotFound(p)
            | FsError::AlreadyExists(p)
            | FsError::NotADirectory(p)
            | FsError::IsADirectory(p)
            | FsError::NotEmpty(p)
            | FsError::AccessDenied(p)
            | FsError::Busy(p)
            | FsError::InvalidArgument(p) => p,
            FsError::Io { path, .. } => path,
        }
    }

    /// POSIX errno for this error, for callers that surface OS-style codes.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::NotADirectory(_) => libc::ENOTDIR,
            FsError::IsADirectory(_) => libc::EISDIR,
            FsError::NotEmpty(_) => libc::ENOTEMPTY,
            FsError::AccessDenied(_) => libc::EACCES,
            FsError::Busy(_) => libc::EBUSY,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::Io { .. } => libc::EIO,
        }
    }

    /// Convenience constructor for opaque store failures.
    pub fn io(path: impl Into<String>, reason: impl Into<String>) -> Self {
        FsError::Io {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(FsError::NotFound("/a".into()).errno(), libc::ENOENT);
        assert_eq!(FsError::AlreadyExists("/a".into()).errno(), libc::EEXIST);
        assert_eq!(FsError::Busy("/a".into()).errno(), libc::EBUSY);
        assert_eq!(FsError::io("/a", "boom").errno(), libc::EIO);
    }

    #[test]
    fn carries_offending_path() {
        let err = FsError::NotADirectory("/a/b".into());
        assert_eq!(err.path(), "/a/b");
        assert_eq!(err.to_string(), "not a directory: /a/b");
    }
}

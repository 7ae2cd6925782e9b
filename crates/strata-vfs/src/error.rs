//! VFS error types.

use std::io;
use thiserror::Error;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// Empty or malformed path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Directory or file absent where the operation requires it.
    #[error("not found: {0}")]
    NotFound(String),

    /// No registered provider accepts the physical source.
    #[error("no provider can read {0}")]
    NoCompatibleProvider(String),

    /// The mount point is not active on this filesystem.
    #[error("mount point not found: {0}")]
    MountPointNotFound(String),

    /// Destination already exists and overwriting was not allowed.
    #[error("already exists: {0}")]
    FileExists(String),

    /// Underlying physical read/write failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create a NoCompatibleProvider error.
    pub fn no_compatible_provider(path: impl Into<String>) -> Self {
        Self::NoCompatibleProvider(path.into())
    }

    /// Create a MountPointNotFound error.
    pub fn mount_point_not_found(mount: impl Into<String>) -> Self {
        Self::MountPointNotFound(mount.into())
    }

    /// Create a FileExists error.
    pub fn file_exists(path: impl Into<String>) -> Self {
        Self::FileExists(path.into())
    }
}

/// Convert VfsError to std::io::Error for callers that speak `io::Result`.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::NoCompatibleProvider(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::MountPointNotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::FileExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::Io(e) => e,
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;

//! Error taxonomy shared by every resource backend.
//!
//! Backends translate their native failures (missing map entries, OS error
//! codes) into [`ResourceError`] so the protocol layer never needs to know
//! which backend it is talking to. [`ResourceErrorKind`] gives the coarse
//! classification callers branch on.

use crate::path::ResourcePath;
use std::io;
use thiserror::Error;

/// Errors raised by [`Resource`](crate::Resource) operations.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The target, or a required ancestor, is absent.
    #[error("Resource does not exist: {0}")]
    DoesNotExist(ResourcePath),

    /// A creation collided with an existing node of the same name.
    #[error("Resource already exists: {0}")]
    AlreadyExists(ResourcePath),

    /// The operation needs a collection but found a file, or vice versa.
    #[error("Invalid resource type: {0}")]
    InvalidType(ResourcePath),

    /// Malformed path, traversal attempt, or a relocation onto itself.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Backend I/O failure outside the taxonomy above.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path being operated on.
        path: ResourcePath,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The content sink or source failed mid-stream.
    #[error("Content stream failed: {0}")]
    Stream(#[source] io::Error),
}

/// Coarse classification of a [`ResourceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceErrorKind {
    /// See [`ResourceError::DoesNotExist`].
    DoesNotExist,
    /// See [`ResourceError::AlreadyExists`].
    AlreadyExists,
    /// See [`ResourceError::InvalidType`].
    InvalidType,
    /// See [`ResourceError::InvalidPath`].
    InvalidPath,
    /// Backend or stream I/O failure.
    Io,
}

impl ResourceError {
    /// Classify an OS error raised while operating on `path`.
    ///
    /// `NotFound` maps to [`DoesNotExist`](Self::DoesNotExist), `AlreadyExists`
    /// and `DirectoryNotEmpty` to [`AlreadyExists`](Self::AlreadyExists), and
    /// `NotADirectory`/`IsADirectory` to [`InvalidType`](Self::InvalidType).
    /// Everything else (permissions, disk full, ...) stays an [`Io`](Self::Io).
    pub fn from_io(path: &ResourcePath, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::DoesNotExist(path.clone()),
            io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
                Self::AlreadyExists(path.clone())
            }
            io::ErrorKind::NotADirectory | io::ErrorKind::IsADirectory => {
                Self::InvalidType(path.clone())
            }
            _ => Self::Io {
                path: path.clone(),
                source,
            },
        }
    }

    /// The coarse kind of this error.
    pub fn kind(&self) -> ResourceErrorKind {
        match self {
            Self::DoesNotExist(_) => ResourceErrorKind::DoesNotExist,
            Self::AlreadyExists(_) => ResourceErrorKind::AlreadyExists,
            Self::InvalidType(_) => ResourceErrorKind::InvalidType,
            Self::InvalidPath(_) => ResourceErrorKind::InvalidPath,
            Self::Io { .. } | Self::Stream(_) => ResourceErrorKind::Io,
        }
    }

    /// The resource path this error refers to, when it names one.
    ///
    /// For a relocation collision this is the occupant of the final target.
    pub fn path(&self) -> Option<&ResourcePath> {
        match self {
            Self::DoesNotExist(p) | Self::AlreadyExists(p) | Self::InvalidType(p) => Some(p),
            Self::Io { path, .. } => Some(path),
            Self::InvalidPath(_) | Self::Stream(_) => None,
        }
    }
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

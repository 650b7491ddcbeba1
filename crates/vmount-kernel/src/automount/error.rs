//! Automount error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;
use vmount_types::{TypesError, VirtualFile};

/// Error raised by a [`MountBackend`](super::MountBackend).
#[derive(Debug, Error)]
pub enum BackendError {
    /// The content to mount does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The backend cannot perform the request.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// I/O error while materializing or releasing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Error surfaced by the [`Automounter`](super::Automounter) and the layers on top of it.
#[derive(Debug, Error)]
pub enum AutomountError {
    /// The backend failed to mount; the registry was left unchanged.
    #[error("failed to mount {target}: {source}")]
    Mount {
        target: VirtualFile,
        source: BackendError,
    },

    /// A cleanup tore down a container of the target while it was being
    /// mounted. The acquired handle has been released.
    #[error("mount of {0} cancelled by cleanup of its container")]
    Cancelled(VirtualFile),

    /// Programming error in the arguments of a call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A virtual path does not resolve to anything.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad identity or path.
    #[error(transparent)]
    Types(#[from] TypesError),

    /// Config file could not be parsed.
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// [`global`](super::global) was called before [`install`](super::install).
    #[error("no automounter installed")]
    NotInstalled,

    /// [`install`](super::install) was called twice.
    #[error("an automounter is already installed")]
    AlreadyInstalled,
}

impl AutomountError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Map a filesystem error on `file` to NotFound when that is what it is.
    pub(crate) fn from_io(file: &VirtualFile, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            Self::not_found(file.to_string())
        } else {
            Self::Io(err)
        }
    }
}

/// Automount result type.
pub type AutomountResult<T> = Result<T, AutomountError>;

//! Errors for constructing identities.

use thiserror::Error;

/// Error building a path or file identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Path contains a segment that cannot be represented (e.g. `..`).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Hierarchy root is empty or not absolute.
    #[error("invalid root: {0}")]
    InvalidRoot(String),
}

impl TypesError {
    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create an InvalidRoot error.
    pub fn invalid_root(root: impl Into<String>) -> Self {
        Self::InvalidRoot(root.into())
    }
}

/// Result type for identity construction.
pub type TypesResult<T> = Result<T, TypesError>;

//! Root-relative virtual paths.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};

/// A normalized path relative to the root of a virtual hierarchy.
///
/// Segments are never empty, `.` or `..`. The empty path names the hierarchy
/// root. Archives are ordinary segments, so a file nested inside two archives
/// is just a longer path: `app.ear/web.war/index.html`.
#[derive(Clone, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VfsPath(Vec<String>);

impl VfsPath {
    /// The hierarchy root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a `/`-separated path. Leading and trailing slashes are ignored.
    pub fn parse(path: &str) -> TypesResult<Self> {
        let mut segments = Vec::new();
        for segment in path.split('/') {
            match segment {
                "" | "." => {}
                ".." => return Err(TypesError::invalid_path(path)),
                s => segments.push(s.to_string()),
            }
        }
        Ok(Self(segments))
    }

    /// Append a relative path.
    pub fn join(&self, relative: &str) -> TypesResult<Self> {
        let tail = Self::parse(relative)?;
        let mut segments = self.0.clone();
        segments.extend(tail.0);
        Ok(Self(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments (0 for the root).
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Parent path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    /// Component-wise prefix test: `a/bc` does not start with `a/b`.
    pub fn starts_with(&self, prefix: &VfsPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Remainder after `prefix`, or `None` if `prefix` is not a prefix.
    pub fn strip_prefix(&self, prefix: &VfsPath) -> Option<VfsPath> {
        self.0.strip_prefix(prefix.0.as_slice()).map(|rest| Self(rest.to_vec()))
    }

    /// Relative filesystem path made of the segments.
    pub fn to_path_buf(&self) -> PathBuf {
        self.0.iter().collect()
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VfsPath({self})")
    }
}

impl FromStr for VfsPath {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VfsPath {
    type Error = TypesError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<VfsPath> for String {
    fn from(path: VfsPath) -> String {
        path.to_string()
    }
}

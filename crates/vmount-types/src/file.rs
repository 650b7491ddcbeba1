//! Virtual file identity.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TypesError, TypesResult};
use crate::path::VfsPath;

/// Identity of a node in a virtual hierarchy.
///
/// A hierarchy is anchored at a physical root directory; every node is named
/// by its [`VfsPath`] under that root. Two `VirtualFile`s are equal when both
/// the root and the path are equal, regardless of which instance produced them.
///
/// Nested archives are addressed by extending the path of the archive that
/// holds them, so containment is a path-prefix relationship (see
/// [`VirtualFile::contains`]).
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "VirtualFileRepr", try_from = "VirtualFileRepr")]
pub struct VirtualFile {
    root: Arc<Path>,
    path: VfsPath,
}

impl VirtualFile {
    /// Create the node at `path` under the hierarchy anchored at `root`.
    ///
    /// `root` must be an absolute directory path.
    pub fn new(root: impl Into<PathBuf>, path: &str) -> TypesResult<Self> {
        let root: PathBuf = root.into();
        if root.as_os_str().is_empty() || !root.is_absolute() {
            return Err(TypesError::invalid_root(root.display().to_string()));
        }
        Ok(Self {
            root: Arc::from(root),
            path: VfsPath::parse(path)?,
        })
    }

    /// The root node of the hierarchy anchored at `root`.
    pub fn root_of(root: impl Into<PathBuf>) -> TypesResult<Self> {
        Self::new(root, "")
    }

    /// Physical directory this hierarchy is anchored at.
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    pub fn is_root(&self) -> bool {
        self.path.is_root()
    }

    /// Last path segment; empty for the hierarchy root.
    pub fn name(&self) -> &str {
        self.path.file_name().unwrap_or("")
    }

    /// A descendant of this node. `relative` may span several segments.
    pub fn child(&self, relative: &str) -> TypesResult<Self> {
        Ok(Self {
            root: Arc::clone(&self.root),
            path: self.path.join(relative)?,
        })
    }

    pub fn parent(&self) -> Option<Self> {
        self.path.parent().map(|path| Self {
            root: Arc::clone(&self.root),
            path,
        })
    }

    /// True iff `other` is this node or nested anywhere beneath it, including
    /// across archive boundaries.
    pub fn contains(&self, other: &VirtualFile) -> bool {
        self.root == other.root && other.path.starts_with(&self.path)
    }

    /// Path of `self` relative to `ancestor`, if `ancestor` contains `self`.
    pub fn relative_to(&self, ancestor: &VirtualFile) -> Option<VfsPath> {
        if self.root != ancestor.root {
            return None;
        }
        self.path.strip_prefix(&ancestor.path)
    }

    /// This node followed by each of its parents up to the hierarchy root.
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: Some(self.clone()),
        }
    }

    /// Where the node lives on disk when nothing above it is mounted.
    pub fn backing_path(&self) -> PathBuf {
        self.root.join(self.path.to_path_buf())
    }
}

/// Iterator returned by [`VirtualFile::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors {
    next: Option<VirtualFile>,
}

impl Iterator for Ancestors {
    type Item = VirtualFile;

    fn next(&mut self) -> Option<VirtualFile> {
        let current = self.next.take()?;
        self.next = current.parent();
        Some(current)
    }
}

impl fmt::Display for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_root() {
            write!(f, "{}", self.root.display())
        } else {
            write!(f, "{}{}", self.root.display(), self.path)
        }
    }
}

impl fmt::Debug for VirtualFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VirtualFile({self})")
    }
}

/// Serialized form: a reference carries no mount state, only its address.
#[derive(Serialize, Deserialize)]
struct VirtualFileRepr {
    root: PathBuf,
    path: VfsPath,
}

impl From<VirtualFile> for VirtualFileRepr {
    fn from(file: VirtualFile) -> Self {
        Self {
            root: file.root.to_path_buf(),
            path: file.path,
        }
    }
}

impl TryFrom<VirtualFileRepr> for VirtualFile {
    type Error = TypesError;

    fn try_from(repr: VirtualFileRepr) -> Result<Self, Self::Error> {
        let mut file = Self::root_of(repr.root)?;
        file.path = repr.path;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vf(path: &str) -> VirtualFile {
        VirtualFile::new("/srv/deploy", path).unwrap()
    }

    #[test]
    fn equality_is_by_value() {
        let a = vf("simple.ear");
        let b = vf("/simple.ear/");
        assert_eq!(a, b);
        assert_ne!(a, vf("other.ear"));
        assert_ne!(a, VirtualFile::new("/srv/elsewhere", "simple.ear").unwrap());
    }

    #[test]
    fn relative_root_is_rejected() {
        assert!(matches!(
            VirtualFile::new("relative/dir", "a.jar"),
            Err(TypesError::InvalidRoot(_))
        ));
        assert!(VirtualFile::root_of("").is_err());
    }

    #[test]
    fn contains_covers_self_and_nested_archives() {
        let ear = vf("simple.ear");
        let war = ear.child("simple.war").unwrap();
        let jar_in_war = war.child("WEB-INF/lib/util.jar").unwrap();

        assert!(ear.contains(&ear));
        assert!(ear.contains(&war));
        assert!(ear.contains(&jar_in_war));
        assert!(war.contains(&jar_in_war));
        assert!(!war.contains(&ear));
        assert!(!ear.contains(&vf("simple.ear2")));
        assert!(!ear.contains(&vf("jar1.jar")));
    }

    #[test]
    fn contains_never_crosses_hierarchies() {
        let here = vf("simple.ear");
        let there = VirtualFile::new("/srv/other", "simple.ear/x.jar").unwrap();
        assert!(!here.contains(&there));
        assert_eq!(there.relative_to(&here), None);
    }

    #[test]
    fn ancestors_walk_to_root() {
        let jar = vf("app.ear/lib/util.jar");
        let names: Vec<String> = jar.ancestors().map(|f| f.path().to_string()).collect();
        assert_eq!(names, ["/app.ear/lib/util.jar", "/app.ear/lib", "/app.ear", "/"]);
    }

    #[test]
    fn backing_path_joins_root() {
        let jar = vf("app.ear/util.jar");
        assert_eq!(jar.backing_path(), PathBuf::from("/srv/deploy/app.ear/util.jar"));
        assert_eq!(jar.name(), "util.jar");
        assert_eq!(jar.parent().unwrap().name(), "app.ear");
        assert_eq!(jar.relative_to(&vf("app.ear")), Some(VfsPath::parse("util.jar").unwrap()));
    }

    #[test]
    fn serde_round_trip_keeps_identity() {
        let jar = vf("outer.jar/jar1.jar");
        let json = serde_json::to_string(&jar).unwrap();
        let back: VirtualFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, jar);
        assert_eq!(back.to_string(), "/srv/deploy/outer.jar/jar1.jar");
    }
}

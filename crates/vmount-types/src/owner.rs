//! Mount owners: who holds a mount alive.
//!
//! The set of owner kinds is closed:
//!
//! - [`MountOwner::File`] compares by [`VirtualFile`] equality and is
//!   hierarchical: it implicitly owns everything its file contains.
//! - [`MountOwner::Object`] compares by the address of the wrapped value. Two
//!   owners over the same allocation are interchangeable; owners over different
//!   allocations never are, however alike the values look.

use std::any::{Any, type_name};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::file::VirtualFile;

/// Opaque owner compared by identity of the wrapped allocation.
#[derive(Clone)]
pub struct ObjectOwner {
    inner: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ObjectOwner {
    pub fn new<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self {
            inner: value,
            type_name: type_name::<T>(),
        }
    }

    /// Wrap an already type-erased value.
    pub fn from_any(value: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            inner: value,
            type_name: "dyn Any",
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.inner).cast::<()>()
    }
}

impl PartialEq for ObjectOwner {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.addr(), other.addr())
    }
}

impl Eq for ObjectOwner {}

impl Hash for ObjectOwner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for ObjectOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectOwner({}@{:p})", self.type_name, self.addr())
    }
}

/// Who a mount is held on behalf of.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MountOwner {
    /// A virtual file; also owns everything nested inside it.
    File(VirtualFile),
    /// An arbitrary value, compared by identity. No hierarchy.
    Object(ObjectOwner),
}

impl MountOwner {
    /// Wrap an arbitrary shared value as an identity-compared owner.
    pub fn object<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self::Object(ObjectOwner::new(value))
    }

    /// Whether cleaning up this owner cascades into contained files.
    pub fn is_hierarchical(&self) -> bool {
        matches!(self, MountOwner::File(_))
    }

    pub fn as_file(&self) -> Option<&VirtualFile> {
        match self {
            MountOwner::File(file) => Some(file),
            MountOwner::Object(_) => None,
        }
    }
}

impl From<VirtualFile> for MountOwner {
    fn from(file: VirtualFile) -> Self {
        Self::File(file)
    }
}

impl From<&VirtualFile> for MountOwner {
    fn from(file: &VirtualFile) -> Self {
        Self::File(file.clone())
    }
}

impl From<ObjectOwner> for MountOwner {
    fn from(owner: ObjectOwner) -> Self {
        Self::Object(owner)
    }
}

impl From<&MountOwner> for MountOwner {
    fn from(owner: &MountOwner) -> Self {
        owner.clone()
    }
}

impl<T: Any + Send + Sync> From<Arc<T>> for MountOwner {
    fn from(value: Arc<T>) -> Self {
        Self::object(value)
    }
}

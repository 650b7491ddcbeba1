//! Reference-counted automounting.
//!
//! Key components:
//!
//! - [`Automounter`] - `mount` / `cleanup` / `is_mounted` facade
//! - [`MountBackend`] - Materializes a virtual file and later undoes it
//! - [`LocalBackend`](backends::LocalBackend) - Exploded archives on local disk, optional temp copies
//! - [`MemoryBackend`](backends::MemoryBackend) - Bookkeeping only (dry runs, tests)
//!
//! ## Design Decisions
//!
//! - **One lock**: the registry is a single mutex; cleanup computes the whole
//!   reference-count and cascade sweep inside it, so nobody observes a
//!   half-cascaded hierarchy.
//! - **Backend calls outside the lock**: concurrent mounts of the same identity
//!   wait on an in-flight marker rather than the mutex.
//! - **Containment is path prefix**: a nested archive's path extends its
//!   container's path.

mod automounter;
mod backend;
pub mod backends;
mod error;
mod registry;

pub use automounter::{Automounter, CleanupReport, ReleaseFailure, global, install};
pub use backend::{MountBackend, MountHandle, MountRequest};
pub use error::{AutomountError, AutomountResult, BackendError};
pub use registry::MountInfo;

//! Mount backends.
//!
//! Backends implement [`MountBackend`](super::MountBackend) for different
//! ways of materializing a virtual file.

mod local;
mod memory;

pub use local::{LocalBackend, LocalHandle};
pub use memory::{MemoryBackend, MemoryHandle};

//! # vmount-kernel
//!
//! Mount lifecycle engine for archive-backed virtual files.
//!
//! Archives (and archives nested in archives) have to be materialized before
//! their contents can be read. The [`Automounter`] tracks who holds each mount
//! alive, invokes the backend once per identity, and on cleanup of a file
//! tears down everything nested inside it. [`VirtualFileSystem`] layers
//! automount-on-access browsing on top.

pub mod automount;
pub mod config;
pub mod vfs;

pub use automount::{
    AutomountError, AutomountResult, Automounter, BackendError, CleanupReport, MountBackend,
    MountHandle, MountInfo, MountRequest, ReleaseFailure,
    backends::{LocalBackend, MemoryBackend},
    global, install,
};
pub use config::AutomountConfig;
pub use vfs::VirtualFileSystem;
pub use vmount_types::{MountOption, MountOptions, MountOwner, ObjectOwner, VfsPath, VirtualFile};

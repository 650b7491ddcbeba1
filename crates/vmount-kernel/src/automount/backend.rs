//! Mount backend trait.
//!
//! A backend turns a virtual file into something directly readable on disk
//! and later undoes that. How it does so (exploding an archive, copying it to
//! a temp location, doing nothing at all) is its own business; the
//! [`Automounter`](super::Automounter) only guarantees it calls `acquire` at
//! most once per identity per mount epoch and `release` exactly once per
//! handle it got back.

use std::any::Any;
use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use vmount_types::{MountOptions, VirtualFile};

use super::error::BackendError;

/// What to mount.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    /// Identity being mounted.
    pub target: &'a VirtualFile,
    /// Current physical location of the target. For a file nested in an
    /// already-mounted archive this points inside that archive's mount.
    pub source: &'a Path,
    /// Options fixed for the lifetime of this mount.
    pub options: MountOptions,
}

/// Releasable result of a successful mount.
///
/// Handles are owned by the registry and handed back to the backend that
/// produced them exactly once.
pub trait MountHandle: Send + Sync + fmt::Debug + 'static {
    /// Where the mounted content can be read.
    fn physical_path(&self) -> &Path;

    /// True if the content is an independent copy of the source.
    fn is_copy(&self) -> bool;

    /// Recover the concrete handle type inside [`MountBackend::release`].
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

/// Materializes virtual files so their contents can be read directly.
#[async_trait]
pub trait MountBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Mount `request.target`.
    ///
    /// With [`MountOption::Copy`](vmount_types::MountOption::Copy) the handle's
    /// physical path must differ from `request.source`.
    async fn acquire(&self, request: MountRequest<'_>)
    -> Result<Box<dyn MountHandle>, BackendError>;

    /// Undo a mount. Called once per handle returned by `acquire`.
    async fn release(&self, handle: Box<dyn MountHandle>) -> Result<(), BackendError>;
}

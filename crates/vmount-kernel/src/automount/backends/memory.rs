//! In-memory bookkeeping backend.
//!
//! Mounts touch nothing on disk: in-place handles point at the request source
//! and copy handles at a synthetic `/memory/<id>/<name>` location. Every call
//! is recorded, and acquire/release failures can be scripted per target.
//! Used for dry runs and testing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use vmount_types::{MountOption, VirtualFile};

use crate::automount::backend::{MountBackend, MountHandle, MountRequest};
use crate::automount::error::BackendError;

/// Root of synthetic copy locations.
const COPY_ROOT: &str = "/memory";

/// In-memory bookkeeping backend.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    next_id: AtomicU64,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    acquire_delay: Option<Duration>,
    release_delay: Option<Duration>,
    fail_acquire: Mutex<HashSet<VirtualFile>>,
    fail_release: Mutex<HashSet<VirtualFile>>,
    released: Mutex<Vec<VirtualFile>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every `acquire`, to widen race windows.
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = Some(delay);
        self
    }

    /// Sleep this long inside every `release`, after it has been counted.
    pub fn with_release_delay(mut self, delay: Duration) -> Self {
        self.release_delay = Some(delay);
        self
    }

    /// Make every future `acquire` of `target` fail.
    pub fn fail_acquire(&self, target: &VirtualFile) {
        self.fail_acquire.lock().insert(target.clone());
    }

    /// Make every future `release` of a handle for `target` fail.
    pub fn fail_release(&self, target: &VirtualFile) {
        self.fail_release.lock().insert(target.clone());
    }

    /// Number of `acquire` calls, successful or not.
    pub fn acquire_count(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }

    /// Number of `release` calls, successful or not.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Targets released so far, in release order.
    pub fn released(&self) -> Vec<VirtualFile> {
        self.released.lock().clone()
    }
}

/// Handle issued by [`MemoryBackend`].
#[derive(Debug)]
pub struct MemoryHandle {
    target: VirtualFile,
    path: PathBuf,
    copy: bool,
}

impl MountHandle for MemoryHandle {
    fn physical_path(&self) -> &Path {
        &self.path
    }

    fn is_copy(&self) -> bool {
        self.copy
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
        self
    }
}

#[async_trait]
impl MountBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn acquire(
        &self,
        request: MountRequest<'_>,
    ) -> Result<Box<dyn MountHandle>, BackendError> {
        self.acquires.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.acquire_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_acquire.lock().contains(request.target) {
            return Err(BackendError::other(format!(
                "scripted acquire failure for {}",
                request.target
            )));
        }

        let copy = request.options.contains(MountOption::Copy);
        let path = if copy {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Path::new(COPY_ROOT)
                .join(id.to_string())
                .join(request.target.name())
        } else {
            request.source.to_path_buf()
        };

        Ok(Box::new(MemoryHandle {
            target: request.target.clone(),
            path,
            copy,
        }))
    }

    async fn release(&self, handle: Box<dyn MountHandle>) -> Result<(), BackendError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.release_delay {
            tokio::time::sleep(delay).await;
        }
        let handle = handle
            .into_any()
            .downcast::<MemoryHandle>()
            .map_err(|_| BackendError::unsupported("handle was not issued by the memory backend"))?;

        self.released.lock().push(handle.target.clone());
        if self.fail_release.lock().contains(&handle.target) {
            return Err(BackendError::other(format!(
                "scripted release failure for {}",
                handle.target
            )));
        }
        Ok(())
    }
}

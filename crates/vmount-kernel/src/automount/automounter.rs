//! The automounter facade: reference-counted mounts with hierarchical cleanup.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use tracing::{debug, info, instrument, warn};
use vmount_types::{MountOption, MountOptions, MountOwner, VirtualFile};

use super::backend::{MountBackend, MountHandle, MountRequest};
use super::backends::LocalBackend;
use super::error::{AutomountError, AutomountResult, BackendError};
use super::registry::{MountInfo, MountRegistry, Reservation, Unmounted};
use crate::config::AutomountConfig;

/// A release that failed. The mount is gone from the registry regardless.
#[derive(Debug)]
pub struct ReleaseFailure {
    pub target: VirtualFile,
    pub error: BackendError,
}

/// What a [`Automounter::cleanup`] call tore down.
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Every identity that stopped being mounted, deepest first.
    pub unmounted: Vec<VirtualFile>,
    /// Releases that failed. Warning-class: the mounts are still considered gone.
    pub failures: Vec<ReleaseFailure>,
}

impl CleanupReport {
    /// Nothing was unmounted.
    pub fn is_noop(&self) -> bool {
        self.unmounted.is_empty()
    }

    /// Every release succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tracks who holds which virtual files mounted.
///
/// - [`mount`](Self::mount) and friends invoke the backend at most once per
///   identity until it is fully unmounted; later calls only add owners.
/// - [`cleanup`](Self::cleanup) drops an owner's claims everywhere and, for a
///   file owner, force-unmounts everything that file contains, releasing each
///   handle exactly once.
/// - [`is_mounted`](Self::is_mounted) reads the registry.
pub struct Automounter {
    backend: Arc<dyn MountBackend>,
    registry: MountRegistry,
    config: AutomountConfig,
}

impl std::fmt::Debug for Automounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Automounter")
            .field("backend", &self.backend.name())
            .field("mounts", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Handles swept out of the registry but not yet released. Whatever is left
/// when this is dropped (a cancelled `cleanup`) is released on a spawned task.
struct PendingReleases {
    backend: Arc<dyn MountBackend>,
    handles: VecDeque<(VirtualFile, bool, Box<dyn MountHandle>)>,
}

impl Drop for PendingReleases {
    fn drop(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        let handles = std::mem::take(&mut self.handles);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(count = handles.len(), "cleanup dropped outside a runtime; handles leaked");
            return;
        };
        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            for (target, _, handle) in handles {
                match backend.release(handle).await {
                    Ok(()) => info!(target = %target, "unmounted after cancelled cleanup"),
                    Err(error) => warn!(target = %target, %error, "release failed"),
                }
            }
        });
    }
}

/// Clears an in-flight reservation unless the mount was published, so a
/// failed or cancelled acquire never strands waiters.
struct ReservationGuard<'a> {
    registry: &'a MountRegistry,
    target: &'a VirtualFile,
    armed: bool,
}

impl ReservationGuard<'_> {
    /// Hands the handle back if a cleanup cancelled the reservation.
    fn publish(
        mut self,
        handle: Box<dyn MountHandle>,
        owner: MountOwner,
        options: MountOptions,
    ) -> Result<(), Box<dyn MountHandle>> {
        self.armed = false;
        self.registry.complete(self.target, handle, owner, options)
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.abandon(self.target);
        }
    }
}

impl Automounter {
    pub fn new(backend: Arc<dyn MountBackend>, config: AutomountConfig) -> Self {
        Self {
            backend,
            registry: MountRegistry::new(),
            config,
        }
    }

    /// Automounter over a [`LocalBackend`] configured from `config`.
    pub fn local(config: AutomountConfig) -> Self {
        let backend = match &config.temp_dir {
            Some(dir) => LocalBackend::with_temp_root(dir),
            None => LocalBackend::new(),
        };
        Self::new(Arc::new(backend), config)
    }

    pub fn config(&self) -> &AutomountConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Mount `target` on its own behalf with default options.
    pub async fn mount(&self, target: &VirtualFile) -> AutomountResult<()> {
        self.mount_owned(target, target, MountOptions::empty()).await
    }

    /// Mount `target` on its own behalf.
    pub async fn mount_with_options(
        &self,
        target: &VirtualFile,
        options: MountOptions,
    ) -> AutomountResult<()> {
        self.mount_owned(target, target, options).await
    }

    /// Mount `target` on behalf of `owner`.
    ///
    /// If `target` is already mounted the owner is added and `options` are
    /// ignored. Otherwise the backend is invoked once; concurrent callers for
    /// the same identity wait for that call and then join its result.
    #[instrument(skip_all, fields(target = %target))]
    pub async fn mount_owned(
        &self,
        owner: impl Into<MountOwner>,
        target: &VirtualFile,
        options: MountOptions,
    ) -> AutomountResult<()> {
        if target.is_root() {
            return Err(AutomountError::invalid_argument(format!(
                "cannot automount the hierarchy root {target}"
            )));
        }
        let owner = owner.into();
        let options = self.effective_options(options);

        loop {
            let source = match self.registry.join_or_reserve(target, &owner) {
                Reservation::Joined => {
                    debug!(?owner, "joined existing mount");
                    return Ok(());
                }
                Reservation::Wait(in_flight) => {
                    debug!("waiting on in-flight mount");
                    in_flight.wait().await;
                    continue;
                }
                Reservation::Reserved { source } => source,
            };

            let guard = ReservationGuard {
                registry: &self.registry,
                target,
                armed: true,
            };
            let request = MountRequest {
                target,
                source: &source,
                options,
            };
            return match self.backend.acquire(request).await {
                Ok(handle) => {
                    info!(
                        backend = self.backend.name(),
                        physical = %handle.physical_path().display(),
                        ?options,
                        "mounted"
                    );
                    match guard.publish(handle, owner, options) {
                        Ok(()) => Ok(()),
                        Err(handle) => {
                            warn!("container was cleaned up during mount; releasing");
                            if let Err(error) = self.backend.release(handle).await {
                                warn!(%error, "release of cancelled mount failed");
                            }
                            Err(AutomountError::Cancelled(target.clone()))
                        }
                    }
                }
                Err(error) => {
                    drop(guard);
                    warn!(%error, "mount failed");
                    Err(AutomountError::Mount {
                        target: target.clone(),
                        source: error,
                    })
                }
            };
        }
    }

    /// Whether `target` currently has a mount record.
    pub fn is_mounted(&self, target: &VirtualFile) -> bool {
        self.registry.contains(target)
    }

    /// Drop every claim `owner` holds; for a file owner, also unmount every
    /// mounted file it contains. Unknown owners are a no-op.
    ///
    /// The registry is updated in one atomic sweep; backend releases follow
    /// outside the lock. Release failures are logged and reported but never
    /// keep a mount alive.
    #[instrument(skip_all)]
    pub async fn cleanup(&self, owner: impl Into<MountOwner>) -> CleanupReport {
        let owner = owner.into();
        debug!(?owner, "cleanup");
        let mut pending = PendingReleases {
            backend: Arc::clone(&self.backend),
            handles: self
                .registry
                .sweep(&owner)
                .into_iter()
                .map(|Unmounted { record, cascaded }| {
                    let (target, handle) = record.into_parts();
                    (target, cascaded, handle)
                })
                .collect(),
        };
        let mut report = CleanupReport::default();

        while let Some((target, cascaded, handle)) = pending.handles.pop_front() {
            if cascaded {
                debug!(target = %target, "unmounting contained file");
            }
            match self.backend.release(handle).await {
                Ok(()) => info!(target = %target, "unmounted"),
                Err(error) => {
                    warn!(target = %target, %error, "release failed; dropping mount anyway");
                    report.failures.push(ReleaseFailure {
                        target: target.clone(),
                        error,
                    });
                }
            }
            report.unmounted.push(target);
        }
        report
    }

    /// Physical location of `target`'s own mount, if mounted.
    pub fn physical_path(&self, target: &VirtualFile) -> Option<PathBuf> {
        self.registry.physical_path(target)
    }

    /// Physical location of `file`, looked up through its nearest mounted
    /// ancestor. Falls back to the in-place backing path.
    pub fn locate(&self, file: &VirtualFile) -> PathBuf {
        self.registry.locate(file)
    }

    /// Every current mount, ordered by target.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        self.registry.snapshot()
    }

    pub fn mount_count(&self) -> usize {
        self.registry.len()
    }

    fn effective_options(&self, requested: MountOptions) -> MountOptions {
        let options = if requested.is_empty() {
            self.config.default_options
        } else {
            requested
        };
        if self.config.force_no_copy {
            options.without(MountOption::Copy)
        } else {
            options
        }
    }
}

static GLOBAL: OnceLock<Arc<Automounter>> = OnceLock::new();

/// Install the process-wide automounter. Only the first call succeeds.
pub fn install(automounter: Arc<Automounter>) -> AutomountResult<()> {
    GLOBAL
        .set(automounter)
        .map_err(|_| AutomountError::AlreadyInstalled)
}

/// The process-wide automounter.
pub fn global() -> AutomountResult<Arc<Automounter>> {
    GLOBAL.get().cloned().ok_or(AutomountError::NotInstalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automount::backends::MemoryBackend;

    fn setup() -> (Arc<MemoryBackend>, Automounter) {
        let backend = Arc::new(MemoryBackend::new());
        let automounter = Automounter::new(backend.clone(), AutomountConfig::default());
        (backend, automounter)
    }

    fn vf(path: &str) -> VirtualFile {
        VirtualFile::new("/vfs/test", path).unwrap()
    }

    #[tokio::test]
    async fn test_mount_and_cleanup() {
        let (backend, automounter) = setup();
        let ear = vf("simple.ear");

        automounter.mount_owned(&ear, &ear, MountOptions::empty()).await.unwrap();
        assert!(automounter.is_mounted(&ear));

        let report = automounter.cleanup(&ear).await;
        assert_eq!(report.unmounted, vec![ear.clone()]);
        assert!(report.is_clean());
        assert!(!automounter.is_mounted(&ear));
        assert_eq!(backend.release_count(), 1);
    }

    #[tokio::test]
    async fn test_mount_is_idempotent() {
        let (backend, automounter) = setup();
        let jar = vf("jar1.jar");

        automounter.mount(&jar).await.unwrap();
        automounter.mount(&jar).await.unwrap();
        automounter
            .mount_owned(Arc::new("other"), &jar, MountOptions::copy())
            .await
            .unwrap();

        assert_eq!(backend.acquire_count(), 1);
        let info = &automounter.list_mounts()[0];
        assert_eq!(info.owner_count, 2);
        assert!(!info.copied, "options of later mounts are ignored");
    }

    #[tokio::test]
    async fn test_mounting_root_is_invalid() {
        let (backend, automounter) = setup();
        let err = automounter.mount(&vf("")).await.unwrap_err();
        assert!(matches!(err, AutomountError::InvalidArgument(_)));
        assert_eq!(backend.acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_mount_leaves_registry_unchanged() {
        let (backend, automounter) = setup();
        let jar = vf("broken.jar");
        backend.fail_acquire(&jar);

        let err = automounter.mount(&jar).await.unwrap_err();
        assert!(matches!(err, AutomountError::Mount { ref target, .. } if *target == jar));
        assert!(!automounter.is_mounted(&jar));
        assert_eq!(automounter.mount_count(), 0);

        // A later attempt is the caller's own retry, not ours.
        let err = automounter.mount(&jar).await.unwrap_err();
        assert!(matches!(err, AutomountError::Mount { .. }));
        assert_eq!(backend.acquire_count(), 2);
    }

    #[tokio::test]
    async fn test_release_failure_still_unmounts() {
        let (backend, automounter) = setup();
        let jar = vf("sticky.jar");
        backend.fail_release(&jar);

        automounter.mount(&jar).await.unwrap();
        let report = automounter.cleanup(&jar).await;

        assert!(!automounter.is_mounted(&jar));
        assert_eq!(report.unmounted, vec![jar.clone()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].target, jar);
        assert!(!report.is_clean());

        // Nothing left to release.
        assert!(automounter.cleanup(&jar).await.is_noop());
        assert_eq!(backend.release_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_unknown_owner_is_noop() {
        let (backend, automounter) = setup();
        automounter.mount(&vf("jar1.jar")).await.unwrap();

        let report = automounter.cleanup(Arc::new(42u32)).await;
        assert!(report.is_noop());
        assert!(automounter.cleanup(&vf("never.jar")).await.is_noop());
        assert_eq!(backend.release_count(), 0);
        assert_eq!(automounter.mount_count(), 1);
    }

    #[tokio::test]
    async fn test_force_no_copy_strips_copy() {
        let backend = Arc::new(MemoryBackend::new());
        let config = AutomountConfig {
            force_no_copy: true,
            ..AutomountConfig::default()
        };
        let automounter = Automounter::new(backend, config);
        let jar = vf("jar1.jar");

        automounter.mount_with_options(&jar, MountOptions::copy()).await.unwrap();
        assert_eq!(automounter.physical_path(&jar), Some(jar.backing_path()));
        assert!(automounter.list_mounts()[0].options.is_empty());
    }

    #[tokio::test]
    async fn test_default_options_apply_to_plain_mounts() {
        let backend = Arc::new(MemoryBackend::new());
        let config = AutomountConfig {
            default_options: MountOptions::copy(),
            ..AutomountConfig::default()
        };
        let automounter = Automounter::new(backend, config);
        let jar = vf("jar1.jar");

        automounter.mount(&jar).await.unwrap();
        let physical = automounter.physical_path(&jar).unwrap();
        assert_ne!(physical, jar.backing_path());
        assert!(automounter.list_mounts()[0].copied);
    }

    #[tokio::test]
    async fn test_nested_mount_reads_from_container_copy() {
        let (_backend, automounter) = setup();
        let ear = vf("simple.ear");
        let jar = ear.child("lib/util.jar").unwrap();

        automounter.mount_with_options(&ear, MountOptions::copy()).await.unwrap();
        automounter.mount(&jar).await.unwrap();

        let ear_copy = automounter.physical_path(&ear).unwrap();
        assert_eq!(automounter.physical_path(&jar), Some(ear_copy.join("lib/util.jar")));
        assert_eq!(
            automounter.locate(&jar.child("a.class").unwrap()),
            ear_copy.join("lib/util.jar/a.class")
        );
    }
}

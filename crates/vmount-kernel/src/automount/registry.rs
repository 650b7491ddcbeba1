//! Mount registry: the single source of truth for "is X mounted".
//!
//! One `parking_lot::Mutex` guards both the mount records and the set of
//! in-flight acquisitions. It is never held across an `.await`: the
//! automounter reserves an identity under the lock, calls the backend without
//! it, then completes or abandons the reservation under the lock again.
//! Concurrent mounts of a reserved identity wait for the outcome instead of
//! calling the backend a second time.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use vmount_types::{MountOptions, MountOwner, VirtualFile};

use super::backend::MountHandle;

/// Point-in-time view of one mount, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    /// The mounted identity.
    pub target: VirtualFile,
    /// Where its content can be read.
    pub physical_path: PathBuf,
    /// Number of distinct owners holding it.
    pub owner_count: usize,
    /// Whether the content is an independent copy.
    pub copied: bool,
    /// Options chosen at first mount.
    pub options: MountOptions,
}

/// Per-identity mount state. Never present in the registry without an owner.
#[derive(Debug)]
pub(crate) struct MountRecord {
    target: VirtualFile,
    handle: Box<dyn MountHandle>,
    owners: HashSet<MountOwner>,
    options: MountOptions,
}

impl MountRecord {
    fn new(
        target: VirtualFile,
        handle: Box<dyn MountHandle>,
        owner: MountOwner,
        options: MountOptions,
    ) -> Self {
        Self {
            target,
            handle,
            owners: HashSet::from([owner]),
            options,
        }
    }

    pub(crate) fn into_parts(self) -> (VirtualFile, Box<dyn MountHandle>) {
        (self.target, self.handle)
    }

    fn info(&self) -> MountInfo {
        MountInfo {
            target: self.target.clone(),
            physical_path: self.handle.physical_path().to_path_buf(),
            owner_count: self.owners.len(),
            copied: self.handle.is_copy(),
            options: self.options,
        }
    }
}

/// An acquisition in progress for one identity.
#[derive(Debug)]
pub(crate) struct InFlight {
    done: watch::Sender<bool>,
}

impl InFlight {
    fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self { done }
    }

    fn finish(&self) {
        self.done.send_replace(true);
    }

    /// Resolve once the acquisition completed or was abandoned.
    pub(crate) async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Outcome of [`MountRegistry::join_or_reserve`].
pub(crate) enum Reservation {
    /// Already mounted; the owner is now recorded on it.
    Joined,
    /// Another caller is acquiring this identity. Wait, then try again.
    Wait(Arc<InFlight>),
    /// The caller must acquire from `source` and then complete or abandon.
    Reserved { source: PathBuf },
}

/// A reservation plus whether a cascade has overtaken it.
struct Reserved {
    in_flight: Arc<InFlight>,
    /// Set when a cleanup tore down a container of the target while the
    /// acquisition was running. The acquired source is no longer valid.
    cancelled: bool,
}

/// Why a record left the registry during a sweep.
#[derive(Debug)]
pub(crate) struct Unmounted {
    pub(crate) record: MountRecord,
    /// Removed because its container was cleaned up, not by reference count.
    pub(crate) cascaded: bool,
}

#[derive(Default)]
struct RegistryState {
    records: HashMap<VirtualFile, MountRecord>,
    in_flight: HashMap<VirtualFile, Reserved>,
}

impl RegistryState {
    /// Physical location of `file`: inside its nearest mounted ancestor (or
    /// itself), else its backing path.
    fn locate(&self, file: &VirtualFile) -> PathBuf {
        for ancestor in file.ancestors() {
            if let Some(record) = self.records.get(&ancestor) {
                let base = record.handle.physical_path();
                return match file.relative_to(&ancestor) {
                    Some(rest) if !rest.is_root() => base.join(rest.to_path_buf()),
                    _ => base.to_path_buf(),
                };
            }
        }
        file.backing_path()
    }
}

/// Concurrent map from identity to mount record.
#[derive(Default)]
pub(crate) struct MountRegistry {
    state: Mutex<RegistryState>,
}

impl MountRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Join an existing mount, wait on an in-flight one, or reserve the
    /// identity for the caller to acquire.
    pub(crate) fn join_or_reserve(&self, target: &VirtualFile, owner: &MountOwner) -> Reservation {
        let mut state = self.state.lock();
        if let Some(record) = state.records.get_mut(target) {
            record.owners.insert(owner.clone());
            return Reservation::Joined;
        }
        if let Some(reserved) = state.in_flight.get(target) {
            return Reservation::Wait(Arc::clone(&reserved.in_flight));
        }
        let source = state.locate(target);
        state.in_flight.insert(
            target.clone(),
            Reserved {
                in_flight: Arc::new(InFlight::new()),
                cancelled: false,
            },
        );
        Reservation::Reserved { source }
    }

    /// Publish a successful acquisition and wake waiters.
    ///
    /// If a cleanup cascaded over `target` while it was being acquired, nothing
    /// is published and the handle comes back for the caller to release.
    pub(crate) fn complete(
        &self,
        target: &VirtualFile,
        handle: Box<dyn MountHandle>,
        owner: MountOwner,
        options: MountOptions,
    ) -> Result<(), Box<dyn MountHandle>> {
        let mut state = self.state.lock();
        let cancelled = match state.in_flight.remove(target) {
            Some(reserved) => {
                reserved.in_flight.finish();
                reserved.cancelled
            }
            None => false,
        };
        if cancelled {
            return Err(handle);
        }
        let record = MountRecord::new(target.clone(), handle, owner, options);
        let previous = state.records.insert(target.clone(), record);
        debug_assert!(previous.is_none(), "completed a mount that was already present");
        Ok(())
    }

    /// Drop a reservation without publishing anything and wake waiters.
    pub(crate) fn abandon(&self, target: &VirtualFile) {
        let mut state = self.state.lock();
        if let Some(reserved) = state.in_flight.remove(target) {
            reserved.in_flight.finish();
        }
    }

    pub(crate) fn contains(&self, target: &VirtualFile) -> bool {
        self.state.lock().records.contains_key(target)
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Physical path of `target`'s own mount, if mounted.
    pub(crate) fn physical_path(&self, target: &VirtualFile) -> Option<PathBuf> {
        let state = self.state.lock();
        state
            .records
            .get(target)
            .map(|record| record.handle.physical_path().to_path_buf())
    }

    /// See [`RegistryState::locate`].
    pub(crate) fn locate(&self, file: &VirtualFile) -> PathBuf {
        self.state.lock().locate(file)
    }

    /// Remove `owner`'s claims everywhere, and when `owner` is a file, every
    /// mount it contains regardless of that mount's owners. Acquisitions in
    /// flight inside that file are cancelled. Runs as one critical section;
    /// the removed records come back deepest first so nested mounts are
    /// released before their containers.
    pub(crate) fn sweep(&self, owner: &MountOwner) -> Vec<Unmounted> {
        let mut state = self.state.lock();
        let scope = owner.as_file();

        if let Some(container) = scope {
            for (target, reserved) in state.in_flight.iter_mut() {
                if container.contains(target) {
                    reserved.cancelled = true;
                }
            }
        }

        let doomed: Vec<(VirtualFile, bool)> = state
            .records
            .iter_mut()
            .filter_map(|(target, record)| {
                let released = record.owners.remove(owner) && record.owners.is_empty();
                let cascaded = scope.is_some_and(|container| container.contains(target));
                (released || cascaded).then(|| (target.clone(), cascaded && !released))
            })
            .collect();

        let mut removed: Vec<Unmounted> = doomed
            .into_iter()
            .filter_map(|(target, cascaded)| {
                state
                    .records
                    .remove(&target)
                    .map(|record| Unmounted { record, cascaded })
            })
            .collect();
        removed.sort_by_key(|u| Reverse(u.record.target.path().depth()));
        removed
    }

    pub(crate) fn snapshot(&self) -> Vec<MountInfo> {
        let state = self.state.lock();
        let mut infos: Vec<MountInfo> = state.records.values().map(MountRecord::info).collect();
        infos.sort_by_key(|info| info.target.to_string());
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[derive(Debug)]
    struct TestHandle(PathBuf);

    impl MountHandle for TestHandle {
        fn physical_path(&self) -> &Path {
            &self.0
        }

        fn is_copy(&self) -> bool {
            false
        }

        fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
            self
        }
    }

    fn vf(path: &str) -> VirtualFile {
        VirtualFile::new("/deploy", path).unwrap()
    }

    fn mount(registry: &MountRegistry, owner: impl Into<MountOwner>, target: &VirtualFile) {
        let owner = owner.into();
        match registry.join_or_reserve(target, &owner) {
            Reservation::Joined => {}
            Reservation::Wait(_) => panic!("unexpected in-flight mount"),
            Reservation::Reserved { source } => registry
                .complete(target, Box::new(TestHandle(source)), owner, MountOptions::empty())
                .unwrap(),
        }
    }

    fn targets(removed: &[Unmounted]) -> Vec<String> {
        removed.iter().map(|u| u.record.target.path().to_string()).collect()
    }

    #[test]
    fn reserve_then_wait_then_join() {
        let registry = MountRegistry::new();
        let jar = vf("jar1.jar");
        let owner = MountOwner::from(&jar);

        let Reservation::Reserved { source } = registry.join_or_reserve(&jar, &owner) else {
            panic!("first caller should reserve");
        };
        assert_eq!(source, PathBuf::from("/deploy/jar1.jar"));
        assert!(!registry.contains(&jar), "reserved is not mounted");
        assert!(matches!(
            registry.join_or_reserve(&jar, &owner),
            Reservation::Wait(_)
        ));

        registry
            .complete(&jar, Box::new(TestHandle(source)), owner.clone(), MountOptions::empty())
            .unwrap();
        assert!(registry.contains(&jar));
        assert!(matches!(registry.join_or_reserve(&jar, &owner), Reservation::Joined));
        assert_eq!(registry.snapshot()[0].owner_count, 1);
    }

    #[test]
    fn abandon_frees_the_reservation() {
        let registry = MountRegistry::new();
        let jar = vf("jar1.jar");
        let owner = MountOwner::from(&jar);

        assert!(matches!(
            registry.join_or_reserve(&jar, &owner),
            Reservation::Reserved { .. }
        ));
        registry.abandon(&jar);
        assert!(!registry.contains(&jar));
        assert!(matches!(
            registry.join_or_reserve(&jar, &owner),
            Reservation::Reserved { .. }
        ));
    }

    #[test]
    fn nested_source_resolves_through_mounted_ancestor() {
        let registry = MountRegistry::new();
        let ear = vf("app.ear");
        let owner = MountOwner::from(&ear);
        let Reservation::Reserved { .. } = registry.join_or_reserve(&ear, &owner) else {
            panic!("reserve");
        };
        registry
            .complete(
                &ear,
                Box::new(TestHandle(PathBuf::from("/tmp/copy-1/app.ear"))),
                owner,
                MountOptions::copy(),
            )
            .unwrap();

        let jar = ear.child("lib/util.jar").unwrap();
        assert_eq!(registry.locate(&jar), PathBuf::from("/tmp/copy-1/app.ear/lib/util.jar"));
        assert_eq!(registry.locate(&ear), PathBuf::from("/tmp/copy-1/app.ear"));
        assert_eq!(registry.locate(&vf("other.jar")), PathBuf::from("/deploy/other.jar"));
        assert_eq!(registry.physical_path(&jar), None);
    }

    #[test]
    fn sweep_reference_counts_object_owners() {
        let registry = MountRegistry::new();
        let jar = vf("jar1.jar");
        let a = MountOwner::object(Arc::new(()));
        let b = MountOwner::object(Arc::new(()));
        mount(&registry, a.clone(), &jar);
        mount(&registry, b.clone(), &jar);

        assert!(registry.sweep(&a).is_empty());
        assert!(registry.contains(&jar));
        assert!(registry.sweep(&a).is_empty(), "second sweep is a no-op");

        let removed = registry.sweep(&b);
        assert_eq!(targets(&removed), ["/jar1.jar"]);
        assert!(!removed[0].cascaded);
        assert!(!registry.contains(&jar));
    }

    #[test]
    fn sweep_cascades_into_contained_files_deepest_first() {
        let registry = MountRegistry::new();
        let ear = vf("simple.ear");
        let war = ear.child("simple.war").unwrap();
        let jar = war.child("WEB-INF/lib/a.jar").unwrap();
        let unrelated = vf("jar1.jar");
        let stranger = MountOwner::object(Arc::new("someone else"));

        mount(&registry, &ear, &ear);
        mount(&registry, stranger.clone(), &war);
        mount(&registry, &jar, &jar);
        mount(&registry, &ear, &unrelated);
        mount(&registry, stranger, &unrelated);

        let removed = registry.sweep(&MountOwner::from(&ear));
        assert_eq!(
            targets(&removed),
            ["/simple.ear/simple.war/WEB-INF/lib/a.jar", "/simple.ear/simple.war", "/simple.ear"]
        );
        assert!(removed[0].cascaded);
        assert!(removed[1].cascaded);
        assert!(!removed[2].cascaded);

        assert!(registry.contains(&unrelated), "still held by the stranger");
        assert_eq!(registry.snapshot()[0].owner_count, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn sweep_cancels_contained_acquisitions() {
        let registry = MountRegistry::new();
        let ear = vf("simple.ear");
        let war = ear.child("simple.war").unwrap();
        let unrelated = vf("jar1.jar");
        mount(&registry, &ear, &ear);

        let Reservation::Reserved { source } = registry.join_or_reserve(&war, &MountOwner::from(&war))
        else {
            panic!("reserve war");
        };
        let Reservation::Reserved { source: other } =
            registry.join_or_reserve(&unrelated, &MountOwner::from(&unrelated))
        else {
            panic!("reserve jar");
        };

        let removed = registry.sweep(&MountOwner::from(&ear));
        assert_eq!(targets(&removed), ["/simple.ear"]);

        let rejected = registry.complete(
            &war,
            Box::new(TestHandle(source.clone())),
            MountOwner::from(&war),
            MountOptions::empty(),
        );
        let handle = rejected.expect_err("cancelled acquisition must not publish");
        assert_eq!(handle.physical_path(), source);
        assert!(!registry.contains(&war));

        registry
            .complete(
                &unrelated,
                Box::new(TestHandle(other)),
                MountOwner::from(&unrelated),
                MountOptions::empty(),
            )
            .unwrap();
        assert!(registry.contains(&unrelated));

        // The reservation is gone, so the next attempt starts fresh.
        assert!(matches!(
            registry.join_or_reserve(&war, &MountOwner::from(&war)),
            Reservation::Reserved { .. }
        ));
    }
}

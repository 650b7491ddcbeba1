//! Automount-on-access browsing.
//!
//! [`VirtualFileSystem`] serves a hierarchy rooted at a physical directory.
//! Whenever a lookup has to look inside an archive, that archive (and every
//! archive above it) is mounted first, self-owned, so closing an outer
//! archive later tears down everything opened beneath it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, instrument};
use vmount_types::{VfsPath, VirtualFile};

use crate::automount::{AutomountError, AutomountResult, Automounter, CleanupReport};

/// A browsable hierarchy backed by an [`Automounter`].
#[derive(Debug, Clone)]
pub struct VirtualFileSystem {
    automounter: Arc<Automounter>,
    root: VirtualFile,
}

impl VirtualFileSystem {
    /// Serve the hierarchy anchored at `root_dir`.
    ///
    /// The directory is canonicalized so identities stay stable across
    /// symlinked spellings of the same root.
    pub fn new(automounter: Arc<Automounter>, root_dir: impl AsRef<Path>) -> AutomountResult<Self> {
        let root_dir = dunce::canonicalize(root_dir.as_ref())?;
        Ok(Self {
            automounter,
            root: VirtualFile::root_of(root_dir)?,
        })
    }

    pub fn automounter(&self) -> &Arc<Automounter> {
        &self.automounter
    }

    /// The hierarchy root.
    pub fn root(&self) -> &VirtualFile {
        &self.root
    }

    /// Identity of `path` under the root. Does not touch the disk.
    pub fn file(&self, path: &str) -> AutomountResult<VirtualFile> {
        Ok(self.root.child(path)?)
    }

    /// Whether `file` is archive-backed, judged by its name.
    pub fn is_archive(&self, file: &VirtualFile) -> bool {
        !file.is_root() && self.automounter.config().is_archive_name(file.name())
    }

    /// Where `file` can currently be read.
    pub fn physical_path(&self, file: &VirtualFile) -> PathBuf {
        self.automounter.locate(file)
    }

    /// Children of `dir`, sorted by name. Mounts `dir` first if it is an archive.
    #[instrument(skip_all, fields(dir = %dir))]
    pub async fn children(&self, dir: &VirtualFile) -> AutomountResult<Vec<VirtualFile>> {
        self.ensure_mounted(dir, true).await?;
        let physical = self.physical_path(dir);

        let mut entries = fs::read_dir(&physical)
            .await
            .map_err(|e| AutomountError::from_io(dir, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                // Not addressable by a VfsPath.
                Err(name) => debug!(?name, "skipping non-UTF-8 entry"),
            }
        }
        names.sort();

        names
            .iter()
            .map(|name| dir.child(name).map_err(AutomountError::from))
            .collect()
    }

    /// Resolve `relative` beneath `base`, mounting every archive it passes through.
    #[instrument(skip_all, fields(base = %base))]
    pub async fn find_child(
        &self,
        base: &VirtualFile,
        relative: &str,
    ) -> AutomountResult<VirtualFile> {
        let relative = VfsPath::parse(relative)?;
        self.ensure_mounted(base, true).await?;

        let mut current = base.clone();
        let segments = relative.segments();
        for (i, segment) in segments.iter().enumerate() {
            current = current.child(segment)?;
            fs::metadata(self.physical_path(&current))
                .await
                .map_err(|e| AutomountError::from_io(&current, e))?;
            if i + 1 < segments.len() && self.is_archive(&current) {
                self.automounter.mount(&current).await?;
            }
        }
        Ok(current)
    }

    /// Contents of `file`, mounting the archives that hold it.
    pub async fn read(&self, file: &VirtualFile) -> AutomountResult<Vec<u8>> {
        self.ensure_mounted(file, false).await?;
        let physical = self.physical_path(file);
        debug!(file = %file, physical = %physical.display(), "read");
        fs::read(&physical)
            .await
            .map_err(|e| AutomountError::from_io(file, e))
    }

    /// Release `file` and everything mounted inside it.
    pub async fn close(&self, file: &VirtualFile) -> CleanupReport {
        self.automounter.cleanup(file).await
    }

    /// Mount each archive from the outermost ancestor of `file` inward.
    async fn ensure_mounted(&self, file: &VirtualFile, include_self: bool) -> AutomountResult<()> {
        let mut chain: Vec<VirtualFile> = file
            .ancestors()
            .skip(usize::from(!include_self))
            .filter(|f| self.is_archive(f))
            .collect();
        chain.reverse();

        for archive in &chain {
            self.automounter.mount(archive).await?;
        }
        Ok(())
    }
}

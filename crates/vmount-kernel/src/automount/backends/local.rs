//! Local filesystem backend.
//!
//! Archives are expected on disk as exploded directories (or plain files).
//! In-place mounts read them where they are; copy mounts duplicate them into a
//! fresh temp directory that is deleted on release.

use std::fs as std_fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::{fs, task};
use vmount_types::MountOption;

use crate::automount::backend::{MountBackend, MountHandle, MountRequest};
use crate::automount::error::BackendError;

/// Prefix for copy-mode temp directories.
const TEMP_PREFIX: &str = "vmount-";

/// Local filesystem backend.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    temp_root: Option<PathBuf>,
}

impl LocalBackend {
    /// Copies go to the system temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies go under `temp_root` (created on demand).
    pub fn with_temp_root(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: Some(temp_root.into()),
        }
    }

    pub fn temp_root(&self) -> Option<&Path> {
        self.temp_root.as_deref()
    }
}

/// Handle issued by [`LocalBackend`].
#[derive(Debug)]
pub struct LocalHandle {
    path: PathBuf,
    copy: Option<TempDir>,
}

impl MountHandle for LocalHandle {
    fn physical_path(&self) -> &Path {
        &self.path
    }

    fn is_copy(&self) -> bool {
        self.copy.is_some()
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any + Send> {
        self
    }
}

#[async_trait]
impl MountBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn acquire(
        &self,
        request: MountRequest<'_>,
    ) -> Result<Box<dyn MountHandle>, BackendError> {
        let source = request.source.to_path_buf();
        let metadata = match fs::metadata(&source).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackendError::not_found(source));
            }
            Err(e) => return Err(e.into()),
        };

        if !request.options.contains(MountOption::Copy) {
            return Ok(Box::new(LocalHandle {
                path: source,
                copy: None,
            }));
        }

        let temp_root = self.temp_root.clone();
        let handle = task::spawn_blocking(move || {
            copy_to_temp(&source, temp_root.as_deref(), metadata.is_dir())
        })
        .await
        .map_err(|e| BackendError::other(format!("copy task failed: {e}")))??;
        Ok(Box::new(handle))
    }

    async fn release(&self, handle: Box<dyn MountHandle>) -> Result<(), BackendError> {
        let handle = handle
            .into_any()
            .downcast::<LocalHandle>()
            .map_err(|_| BackendError::unsupported("handle was not issued by the local backend"))?;

        match handle.copy {
            None => Ok(()),
            Some(dir) => task::spawn_blocking(move || dir.close())
                .await
                .map_err(|e| BackendError::other(format!("cleanup task failed: {e}")))?
                .map_err(BackendError::from),
        }
    }
}

/// Duplicate `source` into a new temp directory, keeping its file name.
fn copy_to_temp(
    source: &Path,
    temp_root: Option<&Path>,
    is_dir: bool,
) -> Result<LocalHandle, BackendError> {
    let name = source
        .file_name()
        .ok_or_else(|| BackendError::other(format!("{} has no file name", source.display())))?;

    let mut builder = tempfile::Builder::new();
    builder.prefix(TEMP_PREFIX);
    let dir = match temp_root {
        Some(root) => {
            std_fs::create_dir_all(root)?;
            builder.tempdir_in(root)?
        }
        None => builder.tempdir()?,
    };

    let dest = dir.path().join(name);
    if is_dir {
        copy_dir_all(source, &dest)?;
    } else {
        std_fs::copy(source, &dest)?;
    }

    Ok(LocalHandle {
        path: dest,
        copy: Some(dir),
    })
}

fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    std_fs::create_dir_all(dst)?;
    for entry in std_fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std_fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

use crate::CoreError;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Advisory lock serializing writers of one project's lock file.
///
/// Held on a sidecar guard file so the lock file itself can be replaced by
/// an atomic rename while the lock is held. Released on drop.
pub struct ProjectLock {
    guard: File,
    path: PathBuf,
}

fn open_guard(path: &Path) -> Result<File, CoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?)
}

impl ProjectLock {
    /// Block until the guard at `path` is free.
    pub fn acquire(path: &Path) -> Result<Self, CoreError> {
        let guard = open_guard(path)?;
        if guard.try_lock_exclusive().is_err() {
            debug!("waiting for {} held by another process", path.display());
            guard.lock_exclusive().map_err(|e| {
                CoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e))
            })?;
        }
        Ok(Self {
            guard,
            path: path.to_path_buf(),
        })
    }

    /// `None` when someone else holds the guard.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, CoreError> {
        let guard = open_guard(path)?;
        match guard.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                guard,
                path: path.to_path_buf(),
            })),
            Err(_) => Ok(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = self.guard.unlock();
    }
}

//! Cross-process storage lock using advisory file locking (fs2 flock).
//!
//! Serializes every mutation of the shared storage directory
//! (`observations.md`, `audit.jsonl`) across processes. Verifying
//! readers take the lock in shared mode: a reader that holds no lock may
//! observe a stale but consistent snapshot — the audit hash check
//! guarantees consistency.
//!
//! The lock file is separate from the observation file because atomic
//! rewrites replace the observation inode; locking the data file itself
//! would leave the lock attached to a dead inode.

use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

const LOCK_FILENAME: &str = ".memory.lock";

/// Advisory file lock for a storage directory.
#[derive(Debug, Clone)]
pub struct MemoryLock {
    path: PathBuf,
}

/// RAII guard that releases the lock on drop.
pub struct MemoryLockGuard {
    file: File,
}

impl Drop for MemoryLockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl MemoryLock {
    pub fn new(storage_dir: &Path) -> Self {
        Self {
            path: storage_dir.join(LOCK_FILENAME),
        }
    }

    /// Blocking exclusive acquire for mutations.
    pub fn exclusive(&self) -> io::Result<MemoryLockGuard> {
        let file = self.lock_file()?;
        file.lock_exclusive()?;
        Ok(MemoryLockGuard { file })
    }

    /// Blocking shared acquire for verifying readers.
    pub fn shared(&self) -> io::Result<MemoryLockGuard> {
        let file = self.lock_file()?;
        file.lock_shared()?;
        Ok(MemoryLockGuard { file })
    }

    /// Non-blocking exclusive attempt — `None` if another process holds it.
    pub fn try_exclusive(&self) -> io::Result<Option<MemoryLockGuard>> {
        let file = self.lock_file()?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(MemoryLockGuard { file })),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            #[cfg(unix)]
            Err(ref e) if e.raw_os_error() == Some(35) || e.raw_os_error() == Some(11) => {
                // EAGAIN(11) / EWOULDBLOCK(35 on macOS) — lock contention
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn lock_file(&self) -> io::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(&self.path)
    }
}

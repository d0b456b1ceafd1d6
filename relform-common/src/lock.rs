//! Cross-process commit lock
//!
//! Guards {allocate sequence, bind upload, append row, persist counter}
//! so that no two commits interleave, whether they run in different
//! threads or in different server processes sharing one data directory.
//! Ownership ends when the returned guard is dropped.

use crate::{Error, Result};
use fs2::FileExt;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Held for the duration of the critical section; dropping releases
pub trait CommitGuard: Send {}

/// Mutual exclusion primitive for the commit critical section
pub trait CommitLock: Send + Sync + fmt::Debug {
    /// Block until exclusive ownership is obtained
    fn acquire(&self) -> Result<Box<dyn CommitGuard + '_>>;
}

/// Advisory exclusive lock on a file (`flock(LOCK_EX)` on Unix)
///
/// Each acquisition opens its own handle, so two threads of one process
/// exclude each other the same way two processes do.
#[derive(Debug, Clone)]
pub struct FileCommitLock {
    path: PathBuf,
    timeout: Option<Duration>,
}

impl FileCommitLock {
    /// `timeout` of `None` waits indefinitely
    pub fn new(path: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        Ok(file)
    }

    fn lock_bounded(&self, file: &File, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(file) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                    if started.elapsed() >= timeout {
                        warn!(
                            "Gave up on commit lock {} after {:?}",
                            self.path.display(),
                            timeout
                        );
                        return Err(Error::LockTimeout {
                            path: self.path.clone(),
                            waited_ms: started.elapsed().as_millis(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl CommitLock for FileCommitLock {
    fn acquire(&self) -> Result<Box<dyn CommitGuard + '_>> {
        let file = self.open()?;
        match self.timeout {
            Some(timeout) => self.lock_bounded(&file, timeout)?,
            None => FileExt::lock_exclusive(&file)?,
        }
        debug!("Acquired commit lock {}", self.path.display());
        Ok(Box::new(FileLockGuard { file }))
    }
}

struct FileLockGuard {
    file: File,
}

impl CommitGuard for FileLockGuard {}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            // Closing the handle below releases the lock regardless
            warn!("Explicit commit lock release failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_lock_file_created_on_first_use() {
        let dir = TempDir::new().unwrap();
        let lock = FileCommitLock::new(dir.path().join("lock"), None);
        assert!(!lock.path().exists());
        let _guard = lock.acquire().unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn test_bounded_wait_times_out_while_held() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        let holder = FileCommitLock::new(&path, None);
        let waiter = FileCommitLock::new(&path, Some(Duration::from_millis(100)));

        let guard = holder.acquire().unwrap();
        assert!(matches!(
            waiter.acquire(),
            Err(Error::LockTimeout { .. })
        ));

        drop(guard);
        assert!(waiter.acquire().is_ok());
    }

    #[test]
    fn test_threads_never_overlap_in_critical_section() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lock");
        let inside = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lock = FileCommitLock::new(&path, None);
                let inside = Arc::clone(&inside);
                let overlaps = Arc::clone(&overlaps);
                thread::spawn(move || {
                    for _ in 0..10 {
                        let _guard = lock.acquire().unwrap();
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        thread::sleep(Duration::from_millis(1));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}

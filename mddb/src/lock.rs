//! Lock coordinator: an in-process readers/writer lock layered above a
//! cross-process advisory lock on the WAL file.
//!
//! Acquisition order is always in-process first, so contention inside
//! one process resolves in user space before any kernel lock traffic.
//! The kernel lock is taken on one shared descriptor, so the shared
//! mode is reference-counted: the first reader locks, the last reader
//! unlocks. A writer can only reach the kernel lock once every
//! in-process reader is gone, which guarantees the count is zero.

use std::fs::File;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use mddb_core::cancel::CancellationToken;
use mddb_core::errors::LockError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn try_lock_shared(file: &File) -> std::io::Result<bool> {
    fs4::fs_std::FileExt::try_lock_shared(file)
}

fn try_lock_exclusive(file: &File) -> std::io::Result<bool> {
    fs4::fs_std::FileExt::try_lock_exclusive(file)
}

fn unlock(file: &File) -> std::io::Result<()> {
    fs4::fs_std::FileExt::unlock(file)
}

pub(crate) struct LockCoordinator {
    rw: RwLock<()>,
    wal: Arc<File>,
    shared_holders: Mutex<u32>,
    timeout: Duration,
}

impl LockCoordinator {
    pub(crate) fn new(wal: Arc<File>, timeout: Duration) -> Self {
        Self {
            rw: RwLock::new(()),
            wal,
            shared_holders: Mutex::new(0),
            timeout,
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    fn check(
        token: &CancellationToken,
        deadline: Instant,
        op: &'static str,
    ) -> Result<(), LockError> {
        if token.is_cancelled() || Instant::now() >= deadline {
            return Err(LockError::DeadlineExceeded { op });
        }
        Ok(())
    }

    /// Take the read side: in-process read lock, then a share of the
    /// file lock.
    pub(crate) fn read(&self, token: &CancellationToken) -> Result<ReadLock<'_>, LockError> {
        let deadline = self.deadline();
        let guard = loop {
            Self::check(token, deadline, "read")?;
            let slice = POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()));
            if let Some(g) = self.rw.try_read_for(slice) {
                break g;
            }
        };
        loop {
            Self::check(token, deadline, "read")?;
            let mut holders = self.shared_holders.lock();
            if *holders > 0 {
                *holders += 1;
                break;
            }
            match try_lock_shared(&self.wal) {
                Ok(true) => {
                    *holders = 1;
                    break;
                }
                Ok(false) => {}
                Err(source) => return Err(LockError::Io { op: "read", source }),
            }
            drop(holders);
            std::thread::sleep(POLL_INTERVAL);
        }
        Ok(ReadLock {
            coord: self,
            guard: Some(guard),
            flock_held: true,
        })
    }

    /// Take the write side: in-process exclusive lock, then the
    /// exclusive file lock.
    pub(crate) fn write(&self, token: &CancellationToken) -> Result<WriteLock<'_>, LockError> {
        let deadline = self.deadline();
        let guard = loop {
            Self::check(token, deadline, "write")?;
            let slice = POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()));
            if let Some(g) = self.rw.try_write_for(slice) {
                break g;
            }
        };
        loop {
            Self::check(token, deadline, "write")?;
            match try_lock_exclusive(&self.wal) {
                Ok(true) => break,
                Ok(false) => std::thread::sleep(POLL_INTERVAL),
                Err(source) => return Err(LockError::Io { op: "write", source }),
            }
        }
        Ok(WriteLock {
            coord: self,
            guard: Some(guard),
            flock_held: true,
        })
    }

    fn release_shared(&self) {
        let mut holders = self.shared_holders.lock();
        *holders = holders.saturating_sub(1);
        if *holders == 0 {
            if let Err(e) = unlock(&self.wal) {
                warn!(error = %e, "failed to release shared wal lock");
            }
        }
    }

    fn release_exclusive(&self) {
        if let Err(e) = unlock(&self.wal) {
            warn!(error = %e, "failed to release exclusive wal lock");
        }
    }
}

/// Idempotent read-lock release handle. Dropping releases too; calling
/// [`ReadLock::release`] more than once is a no-op.
pub(crate) struct ReadLock<'a> {
    coord: &'a LockCoordinator,
    guard: Option<RwLockReadGuard<'a, ()>>,
    flock_held: bool,
}

impl ReadLock<'_> {
    pub(crate) fn release(&mut self) {
        // File lock first, while the in-process lock still excludes
        // writers in this process.
        if self.flock_held {
            self.coord.release_shared();
            self.flock_held = false;
        }
        self.guard.take();
    }
}

impl Drop for ReadLock<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Idempotent write-lock release handle.
pub(crate) struct WriteLock<'a> {
    coord: &'a LockCoordinator,
    guard: Option<RwLockWriteGuard<'a, ()>>,
    flock_held: bool,
}

impl WriteLock<'_> {
    pub(crate) fn release(&mut self) {
        if self.flock_held {
            self.coord.release_exclusive();
            self.flock_held = false;
        }
        self.guard.take();
    }
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

//! Per-instance mutual exclusion and the store-directory advisory lock.

use crate::StoreError;
use fs2::FileExt;
use pawl_graph::InstanceId;
use std::collections::BTreeSet;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// In-process lock table keyed by instance id.
///
/// An attempt holds its instance's lock from scope build through commit; the
/// guard releases on drop and wakes waiters. Attempts on different instances
/// never contend.
#[derive(Debug)]
pub struct LockTable {
    held: Mutex<BTreeSet<InstanceId>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(BTreeSet::new()),
            released: Condvar::new(),
        }
    }

    /// Acquire the exclusive lock for `id`, waiting up to `timeout`.
    pub fn acquire(
        table: &Arc<Self>,
        id: InstanceId,
        timeout: Duration,
    ) -> Result<InstanceLock, StoreError> {
        let deadline = Instant::now() + timeout;
        let mut held = table.held.lock().expect("lock table poisoned");
        while held.contains(&id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::LockTimeout { id, timeout });
            }
            let (guard, _timed_out) = table
                .released
                .wait_timeout(held, deadline - now)
                .expect("lock table poisoned");
            held = guard;
        }
        held.insert(id);
        drop(held);
        Ok(InstanceLock {
            table: Arc::clone(table),
            id,
        })
    }

    fn release(&self, id: InstanceId) {
        let mut held = self.held.lock().expect("lock table poisoned");
        held.remove(&id);
        drop(held);
        self.released.notify_all();
    }

    /// Whether `id` is currently locked. Test and diagnostics helper; the
    /// answer may be stale by the time the caller acts on it.
    pub fn is_held(&self, id: InstanceId) -> bool {
        self.held.lock().expect("lock table poisoned").contains(&id)
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for one instance's lock; releases on drop.
pub struct InstanceLock {
    table: Arc<LockTable>,
    id: InstanceId,
}

impl InstanceLock {
    pub fn id(&self) -> InstanceId {
        self.id
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.table.release(self.id);
    }
}

impl fmt::Debug for InstanceLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLock").field("id", &self.id).finish()
    }
}

/// Advisory file lock on a store directory, guarding against two processes
/// opening the same `FileStore` root.
#[derive(Debug)]
pub struct StoreDirLock {
    lock_file: File,
}

impl StoreDirLock {
    pub fn acquire(lock_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        file.lock_exclusive()
            .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::WouldBlock, e)))?;

        Ok(Self { lock_file: file })
    }

    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>, StoreError> {
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self { lock_file: file })),
            Err(_) => Ok(None),
        }
    }
}

impl Drop for StoreDirLock {
    fn drop(&mut self) {
        let _ = self.lock_file.unlock();
    }
}

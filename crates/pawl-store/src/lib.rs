//! Instance persistence for Pawl.
//!
//! This crate provides the storage layer under the transition pipeline: the
//! durable `InstanceRecord` with blake3 integrity checksums, the object-safe
//! `WorkflowStore` trait the orchestrator drives, a `FileStore` with atomic
//! single-file commits, a `MemoryStore` for tests and stress runs, and the
//! per-instance `LockTable` that serializes concurrent attempts against the
//! same instance.

pub mod file;
pub mod locks;
pub mod memory;
pub mod record;

pub use file::FileStore;
pub use locks::{InstanceLock, LockTable, StoreDirLock};
pub use memory::MemoryStore;
pub use record::InstanceRecord;

use pawl_graph::{InstanceId, WorkflowName};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Fsync a directory so a preceding `rename()` in it is durable.
///
/// ext4 in its default `data=ordered` mode usually makes renames durable on
/// its own, but POSIX gives no such guarantee. An explicit `fsync()` on the
/// parent directory closes the gap on every filesystem and mount option.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("instance {0} not found")]
    NotFound(InstanceId),
    #[error("integrity check failed for instance {id}: expected {expected}, got {actual}")]
    IntegrityFailure {
        id: InstanceId,
        expected: String,
        actual: String,
    },
    #[error("lock on instance {id} not acquired within {timeout:?}")]
    LockTimeout { id: InstanceId, timeout: Duration },
    #[error("store directory is locked by another process: {0}")]
    StoreBusy(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistence handle driven by the transition orchestrator.
///
/// `write` replaces the whole record atomically; it is the single commit point
/// of a transition. `lock` hands out an RAII guard serializing attempts on one
/// instance; attempts on different instances never contend.
pub trait WorkflowStore: Send + Sync {
    /// Allocate a fresh instance id and persist an empty record for it.
    fn create(&self, workflow: &WorkflowName) -> Result<InstanceRecord, StoreError>;

    fn read(&self, id: InstanceId) -> Result<InstanceRecord, StoreError>;

    /// Persist `record`, replacing any previous revision. All-or-nothing.
    fn write(&self, record: &InstanceRecord) -> Result<(), StoreError>;

    /// Delete the record. Removing an unknown instance is a no-op.
    fn remove(&self, id: InstanceId) -> Result<(), StoreError>;

    /// Acquire the exclusive per-instance lock, waiting up to `timeout`.
    fn lock(&self, id: InstanceId, timeout: Duration) -> Result<InstanceLock, StoreError>;

    /// All known instance ids, ascending.
    fn list(&self) -> Result<Vec<InstanceId>, StoreError>;
}

//! File-backed store: one JSON record per instance, atomic replace on write.

use crate::locks::{InstanceLock, LockTable, StoreDirLock};
use crate::record::InstanceRecord;
use crate::{fsync_dir, StoreError, WorkflowStore};
use pawl_graph::{InstanceId, WorkflowName};
use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Durable `WorkflowStore` rooted at a directory.
///
/// Records live under `<root>/instances/<id>.json`. A write goes through a
/// temp file in the same directory, fsync, rename, dir fsync; the rename is
/// the commit point. Reads verify the embedded blake3 checksum. The root
/// carries an advisory file lock so only one process opens a store at a time;
/// instance-level serialization is the in-process `LockTable`.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    next_id: AtomicU64,
    locks: Arc<LockTable>,
    _dir_lock: StoreDirLock,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("instances"))?;

        let dir_lock = StoreDirLock::try_acquire(&root.join(".lock"))?
            .ok_or_else(|| StoreError::StoreBusy(root.display().to_string()))?;

        // Resume the id sequence after the highest record on disk.
        let mut max_id = 0u64;
        for entry in fs::read_dir(root.join("instances"))? {
            let entry = entry?;
            if let Some(id) = parse_record_name(&entry.file_name()) {
                max_id = max_id.max(id);
            }
        }
        debug!(
            "opened store at {}, next instance id {}",
            root.display(),
            max_id + 1
        );

        Ok(Self {
            root,
            next_id: AtomicU64::new(max_id + 1),
            locks: Arc::new(LockTable::new()),
            _dir_lock: dir_lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn instances_dir(&self) -> PathBuf {
        self.root.join("instances")
    }

    fn record_path(&self, id: InstanceId) -> PathBuf {
        self.instances_dir().join(format!("{}.json", id.as_u64()))
    }
}

fn parse_record_name(name: &OsStr) -> Option<u64> {
    name.to_str()?.strip_suffix(".json")?.parse().ok()
}

impl WorkflowStore for FileStore {
    fn create(&self, workflow: &WorkflowName) -> Result<InstanceRecord, StoreError> {
        let id = InstanceId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = InstanceRecord::new(id, workflow.clone());
        self.write(&record)?;
        Ok(record)
    }

    fn read(&self, id: InstanceId) -> Result<InstanceRecord, StoreError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Err(StoreError::NotFound(id));
        }
        let content = fs::read_to_string(&path)?;
        let record: InstanceRecord = serde_json::from_str(&content)?;

        if let Some(ref expected) = record.checksum {
            let actual = record.compute_checksum()?;
            if actual != *expected {
                warn!("instance {id}: record checksum mismatch, rejecting");
                return Err(StoreError::IntegrityFailure {
                    id,
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(record)
    }

    fn write(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        let dest = self.record_path(record.id);

        // The stored form always carries a checksum.
        let mut with_checksum = record.clone();
        with_checksum.checksum = Some(with_checksum.compute_checksum()?);
        let content = serde_json::to_string_pretty(&with_checksum)?;

        let dir = self.instances_dir();
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&dest).map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;

        Ok(())
    }

    fn remove(&self, id: InstanceId) -> Result<(), StoreError> {
        let path = self.record_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn lock(&self, id: InstanceId, timeout: Duration) -> Result<InstanceLock, StoreError> {
        LockTable::acquire(&self.locks, id, timeout)
    }

    fn list(&self) -> Result<Vec<InstanceId>, StoreError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.instances_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(id) = parse_record_name(&entry.file_name()) {
                    ids.push(InstanceId::new(id));
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

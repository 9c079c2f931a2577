//! In-memory store used by tests, benches, and the stress tool.

use crate::locks::{InstanceLock, LockTable};
use crate::record::InstanceRecord;
use crate::{StoreError, WorkflowStore};
use pawl_graph::{InstanceId, WorkflowName};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Volatile `WorkflowStore` with the same locking behavior as `FileStore`
/// but no durability and no checksums.
pub struct MemoryStore {
    records: Mutex<BTreeMap<InstanceId, InstanceRecord>>,
    next_id: AtomicU64,
    locks: Arc<LockTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            locks: Arc::new(LockTable::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowStore for MemoryStore {
    fn create(&self, workflow: &WorkflowName) -> Result<InstanceRecord, StoreError> {
        let id = InstanceId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let record = InstanceRecord::new(id, workflow.clone());
        self.records
            .lock()
            .expect("record map poisoned")
            .insert(id, record.clone());
        Ok(record)
    }

    fn read(&self, id: InstanceId) -> Result<InstanceRecord, StoreError> {
        self.records
            .lock()
            .expect("record map poisoned")
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn write(&self, record: &InstanceRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .expect("record map poisoned")
            .insert(record.id, record.clone());
        Ok(())
    }

    fn remove(&self, id: InstanceId) -> Result<(), StoreError> {
        self.records.lock().expect("record map poisoned").remove(&id);
        Ok(())
    }

    fn lock(&self, id: InstanceId, timeout: Duration) -> Result<InstanceLock, StoreError> {
        LockTable::acquire(&self.locks, id, timeout)
    }

    fn list(&self) -> Result<Vec<InstanceId>, StoreError> {
        Ok(self
            .records
            .lock()
            .expect("record map poisoned")
            .keys()
            .copied()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawl_graph::Value;

    #[test]
    fn create_assigns_increasing_ids() {
        let store = MemoryStore::new();
        let a = store.create(&WorkflowName::from("w")).unwrap();
        let b = store.create(&WorkflowName::from("w")).unwrap();
        assert_eq!(a.id, InstanceId::new(1));
        assert_eq!(b.id, InstanceId::new(2));
    }

    #[test]
    fn read_returns_written_record() {
        let store = MemoryStore::new();
        let mut record = store.create(&WorkflowName::from("w")).unwrap();
        record
            .scope
            .insert("owner".to_owned(), Value::from("sam"));
        store.write(&record).unwrap();

        let back = store.read(record.id).unwrap();
        assert_eq!(back.scope.get("owner"), Some(&Value::from("sam")));
    }

    #[test]
    fn read_unknown_is_not_found() {
        let store = MemoryStore::new();
        let err = store.read(InstanceId::new(99)).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = MemoryStore::new();
        let record = store.create(&WorkflowName::from("w")).unwrap();
        store.remove(record.id).unwrap();
        store.remove(record.id).unwrap();
        assert!(store.read(record.id).is_err());
    }

    #[test]
    fn list_is_sorted() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            store.create(&WorkflowName::from("w")).unwrap();
        }
        let ids = store.list().unwrap();
        assert_eq!(
            ids,
            vec![InstanceId::new(1), InstanceId::new(2), InstanceId::new(3)]
        );
    }

    #[test]
    fn lock_times_out_while_held() {
        let store = MemoryStore::new();
        let record = store.create(&WorkflowName::from("w")).unwrap();
        let _guard = store.lock(record.id, Duration::from_secs(1)).unwrap();
        let err = store.lock(record.id, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }
}

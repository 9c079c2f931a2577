use crate::StoreError;
use pawl_graph::{InstanceId, StepId, Value, WorkflowName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The durable state of one workflow instance.
///
/// `current_steps` is a set: a step join can leave an instance occupying
/// several steps at once. `scope` is the persistent variable mapping; the
/// transient half of an attempt's scope never reaches this record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub workflow: WorkflowName,
    pub current_steps: BTreeSet<StepId>,
    pub scope: BTreeMap<String, Value>,
    pub created_at: String,
    pub updated_at: String,
    /// blake3 checksum for integrity verification. `None` until first written
    /// by a checksumming store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl InstanceRecord {
    /// Fresh record with no current steps and an empty persistent scope.
    pub fn new(id: InstanceId, workflow: impl Into<WorkflowName>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            workflow: workflow.into(),
            current_steps: BTreeSet::new(),
            scope: BTreeMap::new(),
            created_at: now.clone(),
            updated_at: now,
            checksum: None,
        }
    }

    /// Compute the checksum over the record content (excluding the checksum
    /// field itself).
    pub(crate) fn compute_checksum(&self) -> Result<String, StoreError> {
        let mut copy = self.clone();
        copy.checksum = None;
        // Serialize without the checksum field (skip_serializing_if = None)
        let json = serde_json::to_string_pretty(&copy)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    pub fn occupies(&self, step: &StepId) -> bool {
        self.current_steps.contains(step)
    }
}

//! Variable scopes for one transition attempt.
//!
//! An attempt sees three kinds of data: the *transient* scope (fresh per
//! attempt, discarded at the end, may hold values that cannot be serialized),
//! the *persistent* scope (a working copy of the instance's durable map,
//! flushed only on a successful commit), and a fixed set of read-only
//! *injected* variables describing the attempt itself. A key present in both
//! scopes resolves to the transient value.

use pawl_graph::{ActionId, GraphRef, StepId, Value};
use pawl_store::InstanceRecord;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// An entry in the transient scope.
#[derive(Clone)]
pub enum TransientValue {
    /// Serializable payload; can be projected across a remote boundary.
    Plain(Value),
    /// Call-local object with no serialized form. Never leaves the process.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl TransientValue {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        Self::Opaque(Arc::new(value))
    }

    pub fn as_plain(&self) -> Option<&Value> {
        match self {
            Self::Plain(value) => Some(value),
            Self::Opaque(_) => None,
        }
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<&T> {
        match self {
            Self::Plain(_) => None,
            Self::Opaque(value) => value.downcast_ref(),
        }
    }
}

impl fmt::Debug for TransientValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl From<Value> for TransientValue {
    fn from(value: Value) -> Self {
        Self::Plain(value)
    }
}

impl From<bool> for TransientValue {
    fn from(value: bool) -> Self {
        Self::Plain(Value::from(value))
    }
}

impl From<i64> for TransientValue {
    fn from(value: i64) -> Self {
        Self::Plain(Value::from(value))
    }
}

impl From<f64> for TransientValue {
    fn from(value: f64) -> Self {
        Self::Plain(Value::from(value))
    }
}

impl From<&str> for TransientValue {
    fn from(value: &str) -> Self {
        Self::Plain(Value::from(value))
    }
}

impl From<String> for TransientValue {
    fn from(value: String) -> Self {
        Self::Plain(Value::from(value))
    }
}

/// Working copy of an instance's durable scope.
///
/// Mutations land here immediately but reach the store only when the attempt
/// commits; a failed or denied attempt discards the copy unchanged.
#[derive(Debug, Clone)]
pub struct PersistentScope {
    values: BTreeMap<String, Value>,
    dirty: bool,
}

impl PersistentScope {
    pub fn from_record(record: &InstanceRecord) -> Self {
        Self {
            values: record.scope.clone(),
            dirty: false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
        self.dirty = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Whether any mutation happened since the working copy was taken.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

/// Read-only variables injected into every attempt.
///
/// The set is fixed: providers get exactly these, not a grab bag of
/// stringly-keyed entries mixed into the scope maps.
#[derive(Debug, Clone)]
pub struct InjectedVars {
    /// The instance record as read at attempt start. Not updated by the
    /// attempt itself; the post-commit step set is reported separately.
    pub instance: InstanceRecord,
    /// The action being attempted.
    pub action: ActionId,
    /// Steps occupied at attempt start.
    pub current_steps: BTreeSet<StepId>,
    /// Exact graph revision the attempt runs against.
    pub graph: GraphRef,
    /// Caller identity supplied with the request, if any.
    pub caller: Option<String>,
}

/// A value resolved from the combined scope.
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Transient(&'a TransientValue),
    Persistent(&'a Value),
}

impl<'a> Resolved<'a> {
    /// The serializable form, if the resolved entry has one.
    pub fn as_value(&self) -> Option<&'a Value> {
        match self {
            Self::Transient(value) => value.as_plain(),
            Self::Persistent(value) => Some(value),
        }
    }
}

/// The combined scope one attempt runs against.
#[derive(Debug)]
pub struct TransitionScope {
    transient: BTreeMap<String, TransientValue>,
    persistent: PersistentScope,
    injected: InjectedVars,
}

impl TransitionScope {
    pub fn new(persistent: PersistentScope, injected: InjectedVars) -> Self {
        Self {
            transient: BTreeMap::new(),
            persistent,
            injected,
        }
    }

    /// Look a key up, transient scope first.
    pub fn resolve(&self, key: &str) -> Option<Resolved<'_>> {
        if let Some(value) = self.transient.get(key) {
            return Some(Resolved::Transient(value));
        }
        self.persistent.get(key).map(Resolved::Persistent)
    }

    pub fn set_transient(&mut self, key: impl Into<String>, value: impl Into<TransientValue>) {
        self.transient.insert(key.into(), value.into());
    }

    pub fn set_persistent(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.persistent.set(key, value);
    }

    pub fn transient(&self, key: &str) -> Option<&TransientValue> {
        self.transient.get(key)
    }

    pub fn persistent(&self, key: &str) -> Option<&Value> {
        self.persistent.get(key)
    }

    /// Snapshot of the working persistent map, keyed for flush and for remote
    /// projection.
    pub fn persistent_values(&self) -> &BTreeMap<String, Value> {
        self.persistent.values()
    }

    pub fn persistent_dirty(&self) -> bool {
        self.persistent.is_dirty()
    }

    pub fn injected(&self) -> &InjectedVars {
        &self.injected
    }
}

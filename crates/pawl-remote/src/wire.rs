//! Wire types shared by the HTTP adapter and the condition host.
//!
//! Everything here is plain-`Value` JSON; opaque transient entries never cross
//! this boundary.

use pawl_graph::{ActionId, ArgMap, GraphRef, InstanceId, StepId, Value};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One remote evaluation call: everything a hosted condition may inspect.
///
/// `transient` carries only the keys the adapter was told to marshal, never
/// the whole transient scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRequest {
    #[serde(default)]
    pub args: ArgMap,
    #[serde(default)]
    pub transient: BTreeMap<String, Value>,
    #[serde(default)]
    pub persistent: BTreeMap<String, Value>,
    pub instance: InstanceId,
    pub action: ActionId,
    pub current_steps: BTreeSet<StepId>,
    pub graph: GraphRef,
    #[serde(default)]
    pub caller: Option<String>,
}

/// The host's verdict on one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResponse {
    pub passes: bool,
}

/// Body of every non-200 host response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

//! Static workflow definitions for Pawl.
//!
//! This crate defines the graph layer: typed identifiers (`StepId`, `ActionId`,
//! `ProviderName`, `WorkflowName`, `InstanceId`), the argument value model
//! (`Value`, `ArgMap`), boolean condition trees (`ConditionNode`), transition
//! descriptors (`Action`, `FunctionSpec`, `RegisterSpec`), and the validated,
//! content-addressed `WorkflowGraph` with its `GraphRef` identity.
//!
//! Everything here is immutable once built and shared read-only across
//! concurrent transition attempts; the runtime semantics live in `pawl-core`.

pub mod action;
pub mod condition;
pub mod graph;
pub mod types;
pub mod value;

pub use action::{Action, FunctionSpec, RegisterSpec};
pub use condition::{ConditionNode, ConditionSpec};
pub use graph::{GraphBuilder, GraphError, GraphRef, StepDef, WorkflowGraph};
pub use types::{ActionId, InstanceId, ProviderName, StepId, WorkflowName};
pub use value::{ArgMap, Value};

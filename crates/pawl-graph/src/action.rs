//! Transition descriptors: actions, their pre/post function lists, and
//! register declarations.

use crate::condition::ConditionNode;
use crate::types::{ActionId, ProviderName, StepId};
use crate::value::{ArgMap, Value};
use serde::{Deserialize, Serialize};

/// A named function provider reference plus its static argument map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub provider: ProviderName,
    #[serde(default)]
    pub args: ArgMap,
}

impl FunctionSpec {
    pub fn new(provider: impl Into<ProviderName>) -> Self {
        Self {
            provider: provider.into(),
            args: ArgMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A computed transient variable: at scope-build time the named provider runs
/// and its result is placed in the transient scope under `name`, before any
/// condition or function sees the scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterSpec {
    pub name: String,
    pub provider: ProviderName,
    #[serde(default)]
    pub args: ArgMap,
}

impl RegisterSpec {
    pub fn new(name: impl Into<String>, provider: impl Into<ProviderName>) -> Self {
        Self {
            name: name.into(),
            provider: provider.into(),
            args: ArgMap::new(),
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

/// A statically defined transition between steps.
///
/// Applying the action moves an instance from all of its `from` steps to its
/// `to` step, provided the condition tree (if any) permits it. An action with
/// no source steps is an *initial action*: it instantiates the workflow and is
/// only reachable through `initialize`, never through a transition on a live
/// instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    #[serde(default)]
    pub from: Vec<StepId>,
    pub to: StepId,
    #[serde(default)]
    pub condition: Option<ConditionNode>,
    #[serde(default)]
    pub pre: Vec<FunctionSpec>,
    #[serde(default)]
    pub post: Vec<FunctionSpec>,
}

impl Action {
    pub fn new(id: impl Into<ActionId>, name: impl Into<String>, to: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            from: Vec::new(),
            to: to.into(),
            condition: None,
            pre: Vec::new(),
            post: Vec::new(),
        }
    }

    /// Add a source step. Actions consume all of their source steps on commit.
    pub fn from_step(mut self, step: impl Into<StepId>) -> Self {
        self.from.push(step.into());
        self
    }

    pub fn guarded_by(mut self, condition: ConditionNode) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_pre(mut self, function: FunctionSpec) -> Self {
        self.pre.push(function);
        self
    }

    pub fn with_post(mut self, function: FunctionSpec) -> Self {
        self.post.push(function);
        self
    }

    pub fn is_initial(&self) -> bool {
        self.from.is_empty()
    }
}

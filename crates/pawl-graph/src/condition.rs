//! Boolean condition expression trees gating workflow actions.

use crate::types::ProviderName;
use crate::value::{ArgMap, Value};
use serde::{Deserialize, Serialize};

/// A single condition invocation: a named provider, its static arguments, and
/// an optional logical inversion of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionSpec {
    pub provider: ProviderName,
    #[serde(default)]
    pub args: ArgMap,
    #[serde(default)]
    pub negate: bool,
}

impl ConditionSpec {
    pub fn new(provider: impl Into<ProviderName>) -> Self {
        Self {
            provider: provider.into(),
            args: ArgMap::new(),
            negate: false,
        }
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Invert the provider's boolean result.
    pub fn negated(mut self) -> Self {
        self.negate = true;
        self
    }
}

/// A node in a condition expression tree.
///
/// `All` is conjunction, `Any` is disjunction; both evaluate children
/// left-to-right with short-circuiting. An empty `All` is true, an empty `Any`
/// is false. Negation lives on the leaf and flips only that leaf's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionNode {
    Leaf(ConditionSpec),
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
}

impl ConditionNode {
    /// Leaf node invoking `provider` with no arguments.
    pub fn leaf(provider: impl Into<ProviderName>) -> Self {
        ConditionNode::Leaf(ConditionSpec::new(provider))
    }

    pub fn all(children: Vec<ConditionNode>) -> Self {
        ConditionNode::All(children)
    }

    pub fn any(children: Vec<ConditionNode>) -> Self {
        ConditionNode::Any(children)
    }

    /// Number of leaves in the tree.
    pub fn leaf_count(&self) -> usize {
        match self {
            ConditionNode::Leaf(_) => 1,
            ConditionNode::All(children) | ConditionNode::Any(children) => {
                children.iter().map(ConditionNode::leaf_count).sum()
            }
        }
    }
}

impl From<ConditionSpec> for ConditionNode {
    fn from(spec: ConditionSpec) -> Self {
        ConditionNode::Leaf(spec)
    }
}

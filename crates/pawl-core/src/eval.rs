//! Boolean condition-tree evaluation.
//!
//! Trees combine named condition providers with `All` (AND) and `Any` (OR)
//! nodes; a leaf's `negate` flag inverts that leaf alone. Children evaluate
//! left to right and combinators short-circuit, so providers past the deciding
//! child are never invoked. Nothing is cached; every attempt re-evaluates.

use crate::registry::ProviderRegistry;
use crate::scope::TransitionScope;
use pawl_graph::{ConditionNode, ConditionSpec, ProviderName};
use thiserror::Error;
use tracing::debug;

/// Errors raised while evaluating a condition tree.
///
/// Every variant aborts the attempt. A failed evaluation is never read as a
/// denial: "the condition said no" and "the condition could not be asked" are
/// different answers.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("condition provider not found: {0}")]
    ProviderNotFound(ProviderName),
    #[error("remote condition '{provider}' unavailable: {detail}")]
    RemoteUnavailable {
        provider: ProviderName,
        detail: String,
    },
    #[error("malformed arguments for condition '{provider}': {detail}")]
    MalformedArgs {
        provider: ProviderName,
        detail: String,
    },
}

impl EvalError {
    pub fn remote_unavailable(provider: impl Into<ProviderName>, detail: impl Into<String>) -> Self {
        Self::RemoteUnavailable {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn malformed_args(provider: impl Into<ProviderName>, detail: impl Into<String>) -> Self {
        Self::MalformedArgs {
            provider: provider.into(),
            detail: detail.into(),
        }
    }
}

/// Evaluate an action's optional condition tree. An absent tree permits.
pub fn evaluate(
    tree: Option<&ConditionNode>,
    scope: &TransitionScope,
    registry: &ProviderRegistry,
) -> Result<bool, EvalError> {
    match tree {
        None => Ok(true),
        Some(node) => evaluate_node(node, scope, registry),
    }
}

/// Evaluate a single node. Empty `All` is true, empty `Any` is false.
pub fn evaluate_node(
    node: &ConditionNode,
    scope: &TransitionScope,
    registry: &ProviderRegistry,
) -> Result<bool, EvalError> {
    match node {
        ConditionNode::Leaf(spec) => evaluate_leaf(spec, scope, registry),
        ConditionNode::All(children) => {
            for child in children {
                if !evaluate_node(child, scope, registry)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ConditionNode::Any(children) => {
            for child in children {
                if evaluate_node(child, scope, registry)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
    }
}

fn evaluate_leaf(
    spec: &ConditionSpec,
    scope: &TransitionScope,
    registry: &ProviderRegistry,
) -> Result<bool, EvalError> {
    let provider = registry
        .condition(&spec.provider)
        .ok_or_else(|| EvalError::ProviderNotFound(spec.provider.clone()))?;
    let raw = provider.check(scope, &spec.args)?;
    let verdict = raw != spec.negate;
    debug!(
        "condition '{}' -> {verdict} (raw {raw}, negate {})",
        spec.provider, spec.negate
    );
    Ok(verdict)
}

//! Ordered function invocation and register priming.
//!
//! Pre-transition functions are fail-fast: the first error aborts the attempt
//! before anything is committed. Post-transition functions are best-effort:
//! failures are collected into the report while the committed transition
//! stands and the remaining functions still run. The asymmetry is policy, not
//! an accident.

use crate::registry::ProviderRegistry;
use crate::scope::TransitionScope;
use pawl_graph::{FunctionSpec, ProviderName, RegisterSpec};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised by function and register providers.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("function provider not found: {0}")]
    ProviderNotFound(ProviderName),
    #[error("function '{provider}' failed: {detail}")]
    ExecutionFailed {
        provider: ProviderName,
        detail: String,
    },
}

impl FunctionError {
    pub fn failed(provider: impl Into<ProviderName>, detail: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            provider: provider.into(),
            detail: detail.into(),
        }
    }
}

/// One post-function failure, carried in the transition report.
#[derive(Debug)]
pub struct PostFailure {
    pub provider: ProviderName,
    pub error: FunctionError,
}

/// Run pre-transition functions in list order, stopping at the first failure.
///
/// Mutations made by function N are visible to function N+1 through the shared
/// scope.
pub fn run_pre(
    functions: &[FunctionSpec],
    scope: &mut TransitionScope,
    registry: &ProviderRegistry,
) -> Result<(), FunctionError> {
    for spec in functions {
        let provider = registry
            .function(&spec.provider)
            .ok_or_else(|| FunctionError::ProviderNotFound(spec.provider.clone()))?;
        debug!("running pre-function '{}'", spec.provider);
        provider.execute(scope, &spec.args)?;
    }
    Ok(())
}

/// Run post-transition functions in list order, collecting failures.
pub fn run_post(
    functions: &[FunctionSpec],
    scope: &mut TransitionScope,
    registry: &ProviderRegistry,
) -> Vec<PostFailure> {
    let mut failures = Vec::new();
    for spec in functions {
        let result = match registry.function(&spec.provider) {
            Some(provider) => {
                debug!("running post-function '{}'", spec.provider);
                provider.execute(scope, &spec.args)
            }
            None => Err(FunctionError::ProviderNotFound(spec.provider.clone())),
        };
        if let Err(error) = result {
            warn!("post-function '{}' failed: {error}", spec.provider);
            failures.push(PostFailure {
                provider: spec.provider.clone(),
                error,
            });
        }
    }
    failures
}

/// Compute the graph's registers into the transient scope, in declaration
/// order. Later registers see the values of earlier ones.
pub fn prime_registers(
    registers: &[RegisterSpec],
    scope: &mut TransitionScope,
    registry: &ProviderRegistry,
) -> Result<(), FunctionError> {
    for spec in registers {
        let provider = registry
            .register(&spec.provider)
            .ok_or_else(|| FunctionError::ProviderNotFound(spec.provider.clone()))?;
        let value = provider.compute(scope, &spec.args)?;
        debug!("register '{}' primed by '{}'", spec.name, spec.provider);
        scope.set_transient(spec.name.clone(), value);
    }
    Ok(())
}

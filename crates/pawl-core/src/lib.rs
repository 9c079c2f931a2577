//! Transition pipeline for Pawl workflow instances.
//!
//! The [`Engine`] owns a set of workflow graphs, a [`ProviderRegistry`] of
//! conditions, functions and registers, and a handle to a [`WorkflowStore`].
//! Each transition attempt builds a [`TransitionScope`] over the instance
//! record, evaluates the action's condition tree, runs pre-functions, commits
//! the step change, and finally runs post-functions outside the instance
//! lock.
//!
//! Denial is a normal outcome, not an error: an action whose source steps are
//! not occupied or whose conditions evaluate false reports
//! [`Outcome::Denied`] and leaves the instance untouched. Provider failures
//! abort the attempt with an error instead, so a broken condition can never
//! silently pass or silently deny.
//!
//! [`WorkflowStore`]: pawl_store::WorkflowStore

pub mod attempt;
pub mod builtin;
pub mod cancel;
pub mod engine;
pub mod eval;
pub mod invoke;
pub mod registry;
pub mod scope;

pub use attempt::{Outcome, Stage, TransitionReport, TransitionRequest};
pub use builtin::register_builtins;
pub use cancel::{CancelToken, install_signal_handler};
pub use engine::Engine;
pub use eval::{EvalError, evaluate};
pub use invoke::{FunctionError, PostFailure};
pub use registry::{
    ConditionFn, ConditionProvider, FunctionFn, FunctionProvider, ProviderRegistry, RegisterFn,
    RegisterProvider, RegistryBuilder,
};
pub use scope::{InjectedVars, PersistentScope, Resolved, TransientValue, TransitionScope};

use pawl_graph::{ActionId, InstanceId, WorkflowName};
use pawl_store::StoreError;
use std::time::Duration;

/// Errors surfaced by transition attempts.
///
/// A denied attempt is not among these; denial is reported through
/// [`Outcome::Denied`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown workflow '{0}'")]
    UnknownWorkflow(WorkflowName),

    #[error("unknown action '{0}'")]
    UnknownAction(ActionId),

    #[error("action '{0}' is not an initial action")]
    NotInitial(ActionId),

    #[error("condition evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("function invocation failed: {0}")]
    Function(#[from] FunctionError),

    #[error("timed out after {timeout:?} waiting for the lock on instance {instance}")]
    LockTimeout {
        instance: InstanceId,
        timeout: Duration,
    },

    #[error("instance {instance}: commit failed: {source}")]
    Commit {
        instance: InstanceId,
        source: StoreError,
    },

    #[error("attempt cancelled")]
    Cancelled,

    #[error("invalid stage transition: {from} -> {to}")]
    Stage { from: Stage, to: Stage },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

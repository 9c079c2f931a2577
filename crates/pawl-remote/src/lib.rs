//! Remote condition evaluation for Pawl workflows.
//!
//! Workflow conditions do not have to live in the engine process.
//! [`HttpCondition`] implements the condition-provider contract by POSTing a
//! JSON [`EvalRequest`] to a condition host and returning its verdict. The
//! wire carries a projection of the transition scope: static arguments, the
//! explicitly required transient keys, the persistent snapshot, and the
//! injected instance variables.
//!
//! A host that cannot be reached aborts the attempt with
//! `EvalError::RemoteUnavailable`; a remote outage never silently denies or
//! permits a transition.

pub mod config;
pub mod http;
pub mod wire;

pub use config::RemoteConfig;
pub use http::HttpCondition;
pub use wire::{ErrorBody, EvalRequest, EvalResponse};

/// Protocol version sent as `X-Pawl-Protocol` header on all HTTP requests.
/// Hosts can reject clients with incompatible protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

use thiserror::Error;

/// Errors from remote configuration handling.
///
/// Evaluation-time failures surface as `pawl_core::EvalError` through the
/// provider contract instead.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

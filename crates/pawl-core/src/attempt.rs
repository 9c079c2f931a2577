//! The attempt surface: request in, report out, and the stage ordering the
//! pipeline must respect.

use crate::invoke::PostFailure;
use crate::scope::TransientValue;
use crate::EngineError;
use pawl_graph::{ActionId, InstanceId, StepId};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Pipeline stages of one attempt, in execution order.
///
/// `Denied` and pre-commit failures terminate the attempt without reaching
/// the later stages; they are outcomes, not stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    Evaluating,
    RunningPre,
    Committing,
    RunningPost,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Evaluating => "evaluating",
            Self::RunningPre => "running-pre",
            Self::Committing => "committing",
            Self::RunningPost => "running-post",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Validate one stage advance. Stages only move forward, one at a time; an
/// out-of-order advance is a pipeline bug, not a caller mistake.
pub fn validate_stage(from: Stage, to: Stage) -> Result<(), EngineError> {
    let valid = matches!(
        (from, to),
        (Stage::Start, Stage::Evaluating)
            | (Stage::Evaluating, Stage::RunningPre)
            | (Stage::RunningPre, Stage::Committing)
            | (Stage::Committing, Stage::RunningPost)
            | (Stage::RunningPost, Stage::Done)
    );

    if valid {
        Ok(())
    } else {
        Err(EngineError::Stage { from, to })
    }
}

/// Tracks the stage of one in-flight attempt.
#[derive(Debug)]
pub(crate) struct AttemptState {
    stage: Stage,
}

impl AttemptState {
    pub(crate) fn new() -> Self {
        Self {
            stage: Stage::Start,
        }
    }

    pub(crate) fn advance(&mut self, to: Stage) -> Result<(), EngineError> {
        validate_stage(self.stage, to)?;
        debug!("stage {} -> {to}", self.stage);
        self.stage = to;
        Ok(())
    }
}

/// A caller's request to run one action.
#[derive(Debug)]
pub struct TransitionRequest {
    pub action: ActionId,
    /// Transient input, seeded into the attempt's transient scope.
    pub input: BTreeMap<String, TransientValue>,
    /// Caller identity, injected read-only into the scope.
    pub caller: Option<String>,
}

impl TransitionRequest {
    pub fn new(action: impl Into<ActionId>) -> Self {
        Self {
            action: action.into(),
            input: BTreeMap::new(),
            caller: None,
        }
    }

    pub fn input(mut self, key: impl Into<String>, value: impl Into<TransientValue>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }
}

/// Terminal outcome of a completed attempt.
///
/// `Denied` means the conditions (or step applicability) said no; it is a
/// normal answer, distinct from every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    Denied,
}

/// What one attempt did.
#[derive(Debug)]
pub struct TransitionReport {
    pub instance: InstanceId,
    pub action: ActionId,
    pub outcome: Outcome,
    /// Steps occupied when the attempt started.
    pub from_steps: BTreeSet<StepId>,
    /// Steps occupied after the attempt (unchanged unless `Done`).
    pub current_steps: BTreeSet<StepId>,
    /// Post-function failures; only ever non-empty on `Done`.
    pub post_failures: Vec<PostFailure>,
}

impl TransitionReport {
    pub fn is_done(&self) -> bool {
        self.outcome == Outcome::Done
    }

    pub fn is_denied(&self) -> bool {
        self.outcome == Outcome::Denied
    }
}

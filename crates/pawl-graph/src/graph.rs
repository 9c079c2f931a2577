//! The validated workflow graph and its content-addressed identity.

use crate::action::{Action, RegisterSpec};
use crate::types::{ActionId, StepId, WorkflowName};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate step '{0}'")]
    DuplicateStep(StepId),
    #[error("duplicate action '{0}'")]
    DuplicateAction(ActionId),
    #[error("action '{action}' references unknown step '{step}'")]
    UnknownStep { action: ActionId, step: StepId },
    #[error("initial action '{0}' must not declare source steps")]
    InitialWithSources(ActionId),
    #[error("action '{0}' has no source steps; declare it with initial_action")]
    MissingSources(ActionId),
    #[error("duplicate register '{0}'")]
    DuplicateRegister(String),
    #[error("failed to serialize graph for digest: {0}")]
    Digest(#[from] serde_json::Error),
}

/// A named state an instance can occupy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub id: StepId,
    pub name: String,
}

impl StepDef {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Identity of an exact graph revision: workflow name plus content digest.
///
/// Injected into every transition scope and carried on remote evaluation
/// requests, so condition hosts can tell which graph revision an attempt ran
/// against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRef {
    pub name: WorkflowName,
    pub digest: String,
}

impl GraphRef {
    /// Truncated 12-character digest prefix, for display.
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

impl fmt::Display for GraphRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.short_digest())
    }
}

/// An immutable, validated workflow definition.
///
/// Built through [`GraphBuilder`]; construction validates every cross
/// reference, then computes a blake3 digest over the canonical JSON form. Two
/// builders fed the same definition produce byte-identical digests.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowGraph {
    name: WorkflowName,
    steps: BTreeMap<StepId, StepDef>,
    actions: BTreeMap<ActionId, Action>,
    initial: BTreeSet<ActionId>,
    registers: Vec<RegisterSpec>,
    #[serde(skip)]
    digest: String,
}

impl WorkflowGraph {
    pub fn builder(name: impl Into<WorkflowName>) -> GraphBuilder {
        GraphBuilder {
            name: name.into(),
            steps: Vec::new(),
            actions: Vec::new(),
            initial: Vec::new(),
            registers: Vec::new(),
        }
    }

    pub fn name(&self) -> &WorkflowName {
        &self.name
    }

    pub fn step(&self, id: &StepId) -> Option<&StepDef> {
        self.steps.get(id)
    }

    pub fn action(&self, id: &ActionId) -> Option<&Action> {
        self.actions.get(id)
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn is_initial(&self, id: &ActionId) -> bool {
        self.initial.contains(id)
    }

    pub fn initial_actions(&self) -> impl Iterator<Item = &Action> {
        self.initial.iter().filter_map(|id| self.actions.get(id))
    }

    /// Registers run in declaration order at scope-build time.
    pub fn registers(&self) -> &[RegisterSpec] {
        &self.registers
    }

    /// Hex blake3 digest of the canonical JSON form.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn graph_ref(&self) -> GraphRef {
        GraphRef {
            name: self.name.clone(),
            digest: self.digest.clone(),
        }
    }
}

/// Collects steps, actions, and registers, then validates the whole graph.
pub struct GraphBuilder {
    name: WorkflowName,
    steps: Vec<StepDef>,
    actions: Vec<Action>,
    initial: Vec<ActionId>,
    registers: Vec<RegisterSpec>,
}

impl GraphBuilder {
    pub fn step(mut self, step: StepDef) -> Self {
        self.steps.push(step);
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Declare an initial action: it must have no source steps and is the only
    /// way to instantiate the workflow.
    pub fn initial_action(mut self, action: Action) -> Self {
        self.initial.push(action.id.clone());
        self.actions.push(action);
        self
    }

    pub fn register(mut self, register: RegisterSpec) -> Self {
        self.registers.push(register);
        self
    }

    /// Validate cross references and compute the content digest.
    pub fn build(self) -> Result<WorkflowGraph, GraphError> {
        let mut steps = BTreeMap::new();
        for step in self.steps {
            let id = step.id.clone();
            if steps.insert(id.clone(), step).is_some() {
                return Err(GraphError::DuplicateStep(id));
            }
        }

        let initial: BTreeSet<ActionId> = self.initial.into_iter().collect();

        let mut actions = BTreeMap::new();
        for action in self.actions {
            let id = action.id.clone();
            if actions.contains_key(&id) {
                return Err(GraphError::DuplicateAction(id));
            }
            if initial.contains(&id) {
                if !action.from.is_empty() {
                    return Err(GraphError::InitialWithSources(id));
                }
            } else if action.from.is_empty() {
                return Err(GraphError::MissingSources(id));
            }
            for step in &action.from {
                if !steps.contains_key(step) {
                    return Err(GraphError::UnknownStep {
                        action: id.clone(),
                        step: step.clone(),
                    });
                }
            }
            if !steps.contains_key(&action.to) {
                return Err(GraphError::UnknownStep {
                    action: id.clone(),
                    step: action.to.clone(),
                });
            }
            actions.insert(id, action);
        }

        let mut register_names = BTreeSet::new();
        for register in &self.registers {
            if !register_names.insert(register.name.clone()) {
                return Err(GraphError::DuplicateRegister(register.name.clone()));
            }
        }

        let mut graph = WorkflowGraph {
            name: self.name,
            steps,
            actions,
            initial,
            registers: self.registers,
            digest: String::new(),
        };
        // The digest field is serde(skip), so hashing the canonical JSON here
        // covers exactly the definition content.
        let canonical = serde_json::to_vec(&graph)?;
        graph.digest = blake3::hash(&canonical).to_hex().to_string();
        Ok(graph)
    }
}

//! The transition orchestrator.
//!
//! One attempt walks `Start -> Evaluating -> RunningPre -> Committing ->
//! RunningPost -> Done`. Everything through the commit runs under the
//! per-instance lock; post-functions run after the lock is released and can
//! no longer affect the committed state.

use crate::attempt::{AttemptState, Outcome, Stage, TransitionReport, TransitionRequest};
use crate::cancel::CancelToken;
use crate::eval::evaluate;
use crate::invoke::{prime_registers, run_post, run_pre};
use crate::registry::ProviderRegistry;
use crate::scope::{InjectedVars, PersistentScope, TransientValue, TransitionScope};
use crate::EngineError;
use pawl_graph::{Action, ActionId, InstanceId, StepId, WorkflowGraph, WorkflowName};
use pawl_store::{InstanceLock, InstanceRecord, StoreError, WorkflowStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of the locked stages of one attempt.
enum Locked {
    Denied {
        current_steps: BTreeSet<StepId>,
    },
    Committed {
        from_steps: BTreeSet<StepId>,
        current_steps: BTreeSet<StepId>,
        scope: TransitionScope,
    },
}

/// Orchestrates transition attempts over registered workflow graphs.
///
/// The engine is cheap to share: graphs and providers are read-only after
/// construction, and all per-instance mutable state lives behind the store's
/// lock table.
pub struct Engine {
    graphs: BTreeMap<WorkflowName, WorkflowGraph>,
    store: Arc<dyn WorkflowStore>,
    registry: ProviderRegistry,
    lock_timeout: Duration,
}

impl Engine {
    pub fn new(store: Arc<dyn WorkflowStore>, registry: ProviderRegistry) -> Self {
        Self {
            graphs: BTreeMap::new(),
            store,
            registry,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Register a workflow graph. A graph with the same name replaces the
    /// previous revision.
    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        info!("registered workflow {}", graph.graph_ref());
        self.graphs.insert(graph.name().clone(), graph);
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn graph(&self, workflow: &WorkflowName) -> Option<&WorkflowGraph> {
        self.graphs.get(workflow)
    }

    pub fn store(&self) -> &dyn WorkflowStore {
        self.store.as_ref()
    }

    /// Run one action against an existing instance.
    pub fn apply(
        &self,
        instance: InstanceId,
        request: TransitionRequest,
    ) -> Result<TransitionReport, EngineError> {
        self.apply_with_cancel(instance, request, &CancelToken::new())
    }

    /// [`apply`](Self::apply) with cooperative cancellation.
    ///
    /// The token is checked at every stage boundary up to the commit; a
    /// cancelled attempt leaves no state change. Once the commit starts the
    /// attempt runs to completion.
    pub fn apply_with_cancel(
        &self,
        instance: InstanceId,
        request: TransitionRequest,
        cancel: &CancelToken,
    ) -> Result<TransitionReport, EngineError> {
        let mut state = AttemptState::new();
        let guard = self.lock_instance(instance)?;
        let record = self.store.read(instance)?;
        let graph = self.graph_for(&record.workflow)?;
        let Some(action) = graph.action(&request.action) else {
            return Err(EngineError::UnknownAction(request.action));
        };

        // Initial actions instantiate workflows; on a live instance they are
        // denied like any other inapplicable action.
        if action.is_initial() {
            warn!(
                "instance {instance}: denied initial action '{}' on live instance",
                action.id
            );
            return Ok(denied_report(instance, request.action, record.current_steps));
        }

        let locked = self.locked_stages(&mut state, graph, action, record, &request, cancel)?;
        drop(guard);
        self.finish(&mut state, instance, request.action, action, locked)
    }

    /// Run an initial action, creating a new instance.
    ///
    /// On any outcome other than `Done` the created record is removed again;
    /// a rejected initialize leaves no trace in the store.
    pub fn initialize(
        &self,
        workflow: &WorkflowName,
        request: TransitionRequest,
    ) -> Result<TransitionReport, EngineError> {
        self.initialize_with_cancel(workflow, request, &CancelToken::new())
    }

    /// [`initialize`](Self::initialize) with cooperative cancellation.
    pub fn initialize_with_cancel(
        &self,
        workflow: &WorkflowName,
        request: TransitionRequest,
        cancel: &CancelToken,
    ) -> Result<TransitionReport, EngineError> {
        let graph = self.graph_for(workflow)?;
        let Some(action) = graph.action(&request.action) else {
            return Err(EngineError::UnknownAction(request.action));
        };
        if !graph.is_initial(&request.action) {
            return Err(EngineError::NotInitial(request.action));
        }

        let record = self.store.create(workflow)?;
        let instance = record.id;
        info!("instance {instance}: created for workflow '{workflow}'");

        let mut state = AttemptState::new();
        let locked = self.lock_instance(instance).and_then(|guard| {
            let result = self.locked_stages(&mut state, graph, action, record, &request, cancel);
            drop(guard);
            result
        });

        match locked {
            Ok(committed @ Locked::Committed { .. }) => {
                self.finish(&mut state, instance, request.action, action, committed)
            }
            Ok(Locked::Denied { .. }) => {
                self.discard_created(instance);
                Ok(denied_report(instance, request.action, BTreeSet::new()))
            }
            Err(e) => {
                self.discard_created(instance);
                Err(e)
            }
        }
    }

    /// The non-initial actions whose source steps are all occupied and whose
    /// condition tree currently evaluates true.
    ///
    /// Runs without the instance lock; the answer is advisory and can go
    /// stale as soon as a concurrent attempt commits.
    pub fn available_actions(
        &self,
        instance: InstanceId,
        input: &BTreeMap<String, TransientValue>,
        caller: Option<&str>,
    ) -> Result<Vec<ActionId>, EngineError> {
        let record = self.store.read(instance)?;
        let graph = self.graph_for(&record.workflow)?;

        let mut available = Vec::new();
        for action in graph.actions() {
            if action.is_initial() {
                continue;
            }
            if !action.from.iter().all(|step| record.occupies(step)) {
                continue;
            }
            let mut scope = self.build_scope(graph, action, &record, input, caller);
            prime_registers(graph.registers(), &mut scope, &self.registry)?;
            if evaluate(action.condition.as_ref(), &scope, &self.registry)? {
                available.push(action.id.clone());
            }
        }
        Ok(available)
    }

    fn graph_for(&self, workflow: &WorkflowName) -> Result<&WorkflowGraph, EngineError> {
        self.graphs
            .get(workflow)
            .ok_or_else(|| EngineError::UnknownWorkflow(workflow.clone()))
    }

    fn lock_instance(&self, instance: InstanceId) -> Result<InstanceLock, EngineError> {
        match self.store.lock(instance, self.lock_timeout) {
            Ok(guard) => Ok(guard),
            Err(StoreError::LockTimeout { id, timeout }) => Err(EngineError::LockTimeout {
                instance: id,
                timeout,
            }),
            Err(e) => Err(EngineError::Store(e)),
        }
    }

    fn build_scope(
        &self,
        graph: &WorkflowGraph,
        action: &Action,
        record: &InstanceRecord,
        input: &BTreeMap<String, TransientValue>,
        caller: Option<&str>,
    ) -> TransitionScope {
        let injected = InjectedVars {
            instance: record.clone(),
            action: action.id.clone(),
            current_steps: record.current_steps.clone(),
            graph: graph.graph_ref(),
            caller: caller.map(str::to_owned),
        };
        let mut scope = TransitionScope::new(PersistentScope::from_record(record), injected);
        for (key, value) in input {
            scope.set_transient(key.clone(), value.clone());
        }
        scope
    }

    /// Scope build through commit, all under the caller-held instance lock.
    fn locked_stages(
        &self,
        state: &mut AttemptState,
        graph: &WorkflowGraph,
        action: &Action,
        mut record: InstanceRecord,
        request: &TransitionRequest,
        cancel: &CancelToken,
    ) -> Result<Locked, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Applicability gate: every source step must be occupied. Checked
        // before any provider runs.
        if !action.from.iter().all(|step| record.occupies(step)) {
            warn!(
                "instance {}: denied '{}', source steps not occupied (at [{}])",
                record.id,
                action.id,
                step_list(&record.current_steps)
            );
            return Ok(Locked::Denied {
                current_steps: record.current_steps.clone(),
            });
        }

        let mut scope = self.build_scope(
            graph,
            action,
            &record,
            &request.input,
            request.caller.as_deref(),
        );
        prime_registers(graph.registers(), &mut scope, &self.registry)?;

        state.advance(Stage::Evaluating)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        if !evaluate(action.condition.as_ref(), &scope, &self.registry)? {
            warn!(
                "instance {}: denied '{}', conditions evaluated false",
                record.id, action.id
            );
            return Ok(Locked::Denied {
                current_steps: record.current_steps.clone(),
            });
        }

        state.advance(Stage::RunningPre)?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        run_pre(&action.pre, &mut scope, &self.registry)?;

        state.advance(Stage::Committing)?;
        // Last cancellation point; from here the attempt runs to completion.
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let from_steps = record.current_steps.clone();
        let mut next: BTreeSet<StepId> = record
            .current_steps
            .iter()
            .filter(|step| !action.from.contains(step))
            .cloned()
            .collect();
        next.insert(action.to.clone());
        record.current_steps = next;
        record.scope = scope.persistent_values().clone();
        record.touch();
        self.store
            .write(&record)
            .map_err(|source| EngineError::Commit {
                instance: record.id,
                source,
            })?;
        info!(
            "instance {}: committed '{}', [{}] -> [{}]",
            record.id,
            action.id,
            step_list(&from_steps),
            step_list(&record.current_steps)
        );

        Ok(Locked::Committed {
            from_steps,
            current_steps: record.current_steps,
            scope,
        })
    }

    /// Post-commit stages, run after the instance lock is released.
    fn finish(
        &self,
        state: &mut AttemptState,
        instance: InstanceId,
        action_id: ActionId,
        action: &Action,
        locked: Locked,
    ) -> Result<TransitionReport, EngineError> {
        match locked {
            Locked::Denied { current_steps } => {
                Ok(denied_report(instance, action_id, current_steps))
            }
            Locked::Committed {
                from_steps,
                current_steps,
                mut scope,
            } => {
                state.advance(Stage::RunningPost)?;
                let post_failures = run_post(&action.post, &mut scope, &self.registry);
                state.advance(Stage::Done)?;
                Ok(TransitionReport {
                    instance,
                    action: action_id,
                    outcome: Outcome::Done,
                    from_steps,
                    current_steps,
                    post_failures,
                })
            }
        }
    }

    fn discard_created(&self, instance: InstanceId) {
        match self.store.remove(instance) {
            Ok(()) => debug!("instance {instance}: removed rejected record"),
            Err(e) => warn!("instance {instance}: failed to remove rejected record: {e}"),
        }
    }
}

fn denied_report(
    instance: InstanceId,
    action: ActionId,
    current_steps: BTreeSet<StepId>,
) -> TransitionReport {
    TransitionReport {
        instance,
        action,
        outcome: Outcome::Denied,
        from_steps: current_steps.clone(),
        current_steps,
        post_failures: Vec::new(),
    }
}

fn step_list(steps: &BTreeSet<StepId>) -> String {
    steps.iter().map(StepId::as_str).collect::<Vec<_>>().join(", ")
}

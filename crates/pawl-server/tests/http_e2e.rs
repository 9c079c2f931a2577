//! Engine ↔ condition-host E2E integration tests.
//!
//! These tests start a real `pawl-server` in-process on a random port and
//! gate a real engine's transitions through `HttpCondition` against it.
//! No mocks.

use pawl_core::{
    register_builtins, Engine, EngineError, EvalError, ProviderRegistry, TransitionRequest,
};
use pawl_graph::{
    Action, ConditionNode, ConditionSpec, FunctionSpec, StepDef, StepId, Value, WorkflowGraph,
    WorkflowName,
};
use pawl_remote::{ErrorBody, HttpCondition, RemoteConfig};
use pawl_server::{standard_host, ConditionHost, TestServer};
use pawl_store::MemoryStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn client_config(url: &str) -> RemoteConfig {
    RemoteConfig::new(url).with_timeout_secs(2)
}

/// Registry whose named conditions all defer to the host at `url`.
fn remote_registry(url: &str, names: &[&str]) -> ProviderRegistry {
    let mut builder = ProviderRegistry::builder();
    for name in names {
        builder = builder.condition(*name, HttpCondition::new(*name, client_config(url)));
    }
    builder.build()
}

fn engine_with(graph: WorkflowGraph, registry: ProviderRegistry) -> Engine {
    Engine::new(Arc::new(MemoryStore::new()), registry).with_graph(graph)
}

// --- Tests ---

#[test]
fn http_e2e_engine_gates_through_host() {
    let server = TestServer::start(
        ConditionHost::new()
            .host_fn("quorum", |_req| Ok(true))
            .host_fn("embargo", |_req| Ok(false)),
    );

    let graph = WorkflowGraph::builder("publishing")
        .step(StepDef::new("draft", "Draft"))
        .step(StepDef::new("published", "Published"))
        .step(StepDef::new("archived", "Archived"))
        .initial_action(Action::new("open", "Open", "draft"))
        .action(
            Action::new("publish", "Publish", "published")
                .from_step("draft")
                .guarded_by(ConditionNode::leaf("quorum")),
        )
        .action(
            Action::new("archive", "Archive", "archived")
                .from_step("draft")
                .guarded_by(ConditionNode::leaf("embargo")),
        )
        .build()
        .unwrap();
    let engine = engine_with(graph, remote_registry(&server.url, &["quorum", "embargo"]));

    let workflow = WorkflowName::from("publishing");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("open"))
        .unwrap()
        .instance;

    let archived = engine
        .apply(instance, TransitionRequest::new("archive"))
        .unwrap();
    assert!(archived.is_denied(), "remote false verdict denies");

    let published = engine
        .apply(instance, TransitionRequest::new("publish"))
        .unwrap();
    assert!(published.is_done(), "remote true verdict permits");
    assert!(published
        .current_steps
        .contains(&StepId::from("published")));
}

#[test]
fn http_e2e_standard_conditions_gate_on_persistent_scope() {
    let server = TestServer::start(standard_host());

    let graph = WorkflowGraph::builder("ticketing")
        .step(StepDef::new("open", "Open"))
        .step(StepDef::new("triaged", "Triaged"))
        .step(StepDef::new("closed", "Closed"))
        .initial_action(
            Action::new("file", "File", "open").with_pre(
                FunctionSpec::new("set_scope")
                    .arg("key", "severity")
                    .arg("value", "high"),
            ),
        )
        .action(
            Action::new("escalate", "Escalate", "triaged")
                .from_step("open")
                .guarded_by(
                    ConditionSpec::new("scope_equals")
                        .arg("key", "severity")
                        .arg("value", "high")
                        .into(),
                ),
        )
        .action(
            Action::new("dismiss", "Dismiss", "closed")
                .from_step("open")
                .guarded_by(
                    ConditionSpec::new("scope_equals")
                        .arg("key", "severity")
                        .arg("value", "low")
                        .into(),
                ),
        )
        .build()
        .unwrap();

    // The local built-ins run the pre-function; the condition leaf is overridden
    // to defer to the host, which sees the persistent snapshot over the wire.
    let registry = register_builtins(ProviderRegistry::builder())
        .condition(
            "scope_equals",
            HttpCondition::new("scope_equals", client_config(&server.url)),
        )
        .build();
    let engine = engine_with(graph, registry);

    let workflow = WorkflowName::from("ticketing");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("file"))
        .unwrap()
        .instance;

    let dismissed = engine
        .apply(instance, TransitionRequest::new("dismiss"))
        .unwrap();
    assert!(dismissed.is_denied(), "severity is high, not low");

    let escalated = engine
        .apply(instance, TransitionRequest::new("escalate"))
        .unwrap();
    assert!(escalated.is_done());
}

#[test]
fn http_e2e_required_transient_crosses_the_wire() {
    let server = TestServer::start(standard_host());

    let graph = WorkflowGraph::builder("gatekeeper")
        .step(StepDef::new("waiting", "Waiting"))
        .step(StepDef::new("admitted", "Admitted"))
        .initial_action(Action::new("arrive", "Arrive", "waiting"))
        .action(
            Action::new("admit", "Admit", "admitted")
                .from_step("waiting")
                .guarded_by(
                    ConditionSpec::new("scope_equals")
                        .arg("key", "ticket")
                        .arg("value", 7341)
                        .into(),
                ),
        )
        .build()
        .unwrap();
    let registry = ProviderRegistry::builder()
        .condition(
            "scope_equals",
            HttpCondition::new("scope_equals", client_config(&server.url)).require("ticket"),
        )
        .build();
    let engine = engine_with(graph, registry);

    let workflow = WorkflowName::from("gatekeeper");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("arrive"))
        .unwrap()
        .instance;

    let wrong = engine
        .apply(
            instance,
            TransitionRequest::new("admit").input("ticket", Value::Int(999)),
        )
        .unwrap();
    assert!(wrong.is_denied(), "mismatched transient input denies");

    let right = engine
        .apply(
            instance,
            TransitionRequest::new("admit").input("ticket", Value::Int(7341)),
        )
        .unwrap();
    assert!(right.is_done(), "matching transient input permits");
}

#[test]
fn http_e2e_timeout_aborts_attempt() {
    let server = TestServer::start(ConditionHost::new().host_fn("slow", |_req| {
        std::thread::sleep(Duration::from_secs(3));
        Ok(true)
    }));

    let tally = Arc::new(AtomicUsize::new(0));
    let graph = WorkflowGraph::builder("slowpath")
        .step(StepDef::new("a", "A"))
        .step(StepDef::new("b", "B"))
        .initial_action(Action::new("start", "Start", "a"))
        .action(
            Action::new("go", "Go", "b")
                .from_step("a")
                .guarded_by(ConditionNode::leaf("slow"))
                .with_pre(FunctionSpec::new("tally"))
                .with_post(FunctionSpec::new("tally")),
        )
        .build()
        .unwrap();
    let tally_fn = Arc::clone(&tally);
    let registry = ProviderRegistry::builder()
        .condition(
            "slow",
            HttpCondition::new("slow", RemoteConfig::new(&server.url).with_timeout_secs(1)),
        )
        .function_fn("tally", move |_scope, _args| {
            tally_fn.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();
    let engine = engine_with(graph, registry);

    let workflow = WorkflowName::from("slowpath");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("start"))
        .unwrap()
        .instance;
    let before = engine.store().read(instance).unwrap();

    let err = engine
        .apply(instance, TransitionRequest::new("go"))
        .unwrap_err();
    assert!(
        matches!(
            err,
            EngineError::Evaluation(EvalError::RemoteUnavailable { .. })
        ),
        "timeout must abort, not deny: {err}"
    );

    // The aborted attempt ran no functions and left the record untouched.
    assert_eq!(tally.load(Ordering::SeqCst), 0);
    let after = engine.store().read(instance).unwrap();
    assert_eq!(after.current_steps, before.current_steps);
    assert_eq!(after.scope, before.scope);
    assert_eq!(after.updated_at, before.updated_at);
}

#[test]
fn http_e2e_unknown_condition_is_provider_not_found() {
    let server = TestServer::start(standard_host());

    let graph = WorkflowGraph::builder("ghostly")
        .step(StepDef::new("a", "A"))
        .step(StepDef::new("b", "B"))
        .initial_action(Action::new("start", "Start", "a"))
        .action(
            Action::new("go", "Go", "b")
                .from_step("a")
                .guarded_by(ConditionNode::leaf("ghost")),
        )
        .build()
        .unwrap();
    let engine = engine_with(graph, remote_registry(&server.url, &["ghost"]));

    let workflow = WorkflowName::from("ghostly");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("start"))
        .unwrap()
        .instance;

    let err = engine
        .apply(instance, TransitionRequest::new("go"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Evaluation(EvalError::ProviderNotFound(_))
    ));
}

#[test]
fn http_e2e_rejected_arguments_are_malformed_args() {
    let server = TestServer::start(standard_host());

    // scope_equals without its required arguments draws a 422 from the host.
    let graph = WorkflowGraph::builder("sloppy")
        .step(StepDef::new("a", "A"))
        .step(StepDef::new("b", "B"))
        .initial_action(Action::new("start", "Start", "a"))
        .action(
            Action::new("go", "Go", "b")
                .from_step("a")
                .guarded_by(ConditionNode::leaf("scope_equals")),
        )
        .build()
        .unwrap();
    let engine = engine_with(graph, remote_registry(&server.url, &["scope_equals"]));

    let workflow = WorkflowName::from("sloppy");
    let instance = engine
        .initialize(&workflow, TransitionRequest::new("start"))
        .unwrap()
        .instance;

    let err = engine
        .apply(instance, TransitionRequest::new("go"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Evaluation(EvalError::MalformedArgs { .. })
    ));
}

#[test]
fn http_e2e_health_and_condition_listing() {
    let server = TestServer::start(standard_host());

    let mut health = ureq::get(format!("{}/health", server.url)).call().unwrap();
    assert_eq!(health.status(), 200);
    assert_eq!(
        health.body_mut().read_to_string().unwrap(),
        r#"{"status":"ok"}"#
    );

    let mut listing = ureq::get(format!("{}/conditions", server.url))
        .call()
        .unwrap();
    let names: Vec<String> =
        serde_json::from_str(&listing.body_mut().read_to_string().unwrap()).unwrap();
    assert_eq!(
        names,
        vec!["caller_is", "current_step_is", "scope_defined", "scope_equals"]
    );
}

#[test]
fn http_e2e_protocol_header_is_enforced() {
    let server = TestServer::start(standard_host());
    let url = format!("{}/conditions/scope_defined", server.url);

    // Missing header.
    let mut missing = ureq::post(&*url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_empty()
        .unwrap();
    assert_eq!(missing.status(), 400);
    let body: ErrorBody =
        serde_json::from_str(&missing.body_mut().read_to_string().unwrap()).unwrap();
    assert!(
        body.error.contains("X-Pawl-Protocol"),
        "unexpected error body: {}",
        body.error
    );

    // Wrong version.
    let mut wrong = ureq::post(&*url)
        .config()
        .http_status_as_error(false)
        .build()
        .header("X-Pawl-Protocol", "99")
        .send_empty()
        .unwrap();
    assert_eq!(wrong.status(), 400);
    let body: ErrorBody =
        serde_json::from_str(&wrong.body_mut().read_to_string().unwrap()).unwrap();
    assert!(
        body.error.contains("unsupported protocol version"),
        "unexpected error body: {}",
        body.error
    );
}

#[test]
fn http_e2e_concurrent_instances() {
    let server = TestServer::start(ConditionHost::new().host_fn("quorum", |_req| Ok(true)));

    let graph = WorkflowGraph::builder("parallel")
        .step(StepDef::new("a", "A"))
        .step(StepDef::new("b", "B"))
        .initial_action(Action::new("start", "Start", "a"))
        .action(
            Action::new("go", "Go", "b")
                .from_step("a")
                .guarded_by(ConditionNode::leaf("quorum")),
        )
        .build()
        .unwrap();
    let engine = Arc::new(engine_with(graph, remote_registry(&server.url, &["quorum"])));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                let workflow = WorkflowName::from("parallel");
                let instance = engine
                    .initialize(&workflow, TransitionRequest::new("start"))
                    .unwrap()
                    .instance;
                let report = engine.apply(instance, TransitionRequest::new("go")).unwrap();
                assert!(report.is_done());
                instance
            })
        })
        .collect();

    let mut instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    instances.sort_unstable();
    instances.dedup();
    assert_eq!(instances.len(), 4, "each worker got its own instance");
}

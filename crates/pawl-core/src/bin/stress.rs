//! Concurrency stress for the Pawl engine.
//!
//! Hammers a single ping/pong instance from many threads and checks the
//! serialization invariants afterwards: every committed transition ran its
//! pre-function exactly once, the persistent rally counter saw no lost
//! updates, and the instance ends on the step the rally parity predicts.
//!
//! Usage:
//!   cargo run --bin stress -- [--threads N] [--cycles N]

use pawl_core::{Engine, ProviderRegistry, TransitionRequest, TransitionScope};
use pawl_graph::{
    Action, ArgMap, FunctionSpec, InstanceId, StepDef, StepId, Value, WorkflowGraph, WorkflowName,
};
use pawl_store::{MemoryStore, WorkflowStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

fn relay_graph() -> WorkflowGraph {
    WorkflowGraph::builder("relay")
        .step(StepDef::new("ping", "Ping"))
        .step(StepDef::new("pong", "Pong"))
        .initial_action(Action::new("serve", "Serve", "ping"))
        .action(
            Action::new("pong", "Pong", "pong")
                .from_step("ping")
                .with_pre(FunctionSpec::new("bump")),
        )
        .action(
            Action::new("ping", "Ping", "ping")
                .from_step("pong")
                .with_pre(FunctionSpec::new("bump")),
        )
        .build()
        .expect("relay graph")
}

#[derive(Default)]
struct Outcomes {
    done: u64,
    denied: u64,
    errors: u64,
}

fn run_worker(engine: &Engine, instance: InstanceId, cycles: usize) -> Outcomes {
    let mut outcomes = Outcomes::default();
    for _ in 0..cycles {
        for action in ["pong", "ping"] {
            match engine.apply(instance, TransitionRequest::new(action)) {
                Ok(report) if report.is_done() => outcomes.done += 1,
                Ok(_) => outcomes.denied += 1,
                Err(e) => {
                    eprintln!("  worker error: {e}");
                    outcomes.errors += 1;
                }
            }
        }
    }
    outcomes
}

fn print_report(
    threads: usize,
    cycles: usize,
    totals: &Outcomes,
    bumps: u64,
    record_rallies: i64,
    final_steps: &[StepId],
    elapsed_secs: f64,
) {
    let attempts = (threads * cycles * 2) as u64;
    let mut failures = 0u64;

    println!();
    println!("============================================");
    println!(
        "Results: {attempts} attempts, {} done, {} denied, {} errors",
        totals.done, totals.denied, totals.errors
    );
    println!(
        "  wall time: {elapsed_secs:.3}s total, {:.3}ms avg per attempt",
        elapsed_secs * 1000.0 / attempts as f64
    );

    if totals.errors > 0 {
        failures += totals.errors;
    }
    if totals.done + totals.denied + totals.errors != attempts {
        eprintln!("  ACCOUNTING MISMATCH: outcomes do not sum to attempts");
        failures += 1;
    }
    if bumps != totals.done {
        eprintln!(
            "  PRE-FUNCTION MISMATCH: {bumps} bumps for {} commits",
            totals.done
        );
        failures += 1;
    }
    if u64::try_from(record_rallies).ok() != Some(totals.done) {
        eprintln!(
            "  LOST UPDATE: persistent rally counter {record_rallies}, expected {}",
            totals.done
        );
        failures += 1;
    }
    if final_steps.len() != 1 {
        eprintln!("  STEP LEAK: instance occupies {} steps", final_steps.len());
        failures += 1;
    } else {
        let expected = if totals.done.is_multiple_of(2) { "ping" } else { "pong" };
        if final_steps[0] != expected {
            eprintln!(
                "  PARITY MISMATCH: {} commits should end on '{expected}', found '{}'",
                totals.done, final_steps[0]
            );
            failures += 1;
        }
    }
    println!("  pre-function runs: {bumps}");
    println!("  persistent rallies: {record_rallies}");
    println!(
        "  final step: {}",
        final_steps
            .iter()
            .map(StepId::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    );

    if failures > 0 {
        eprintln!("\nSTRESS TEST FAILED");
        std::process::exit(1);
    } else {
        println!("\nSTRESS TEST PASSED");
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let threads: usize = args
        .iter()
        .position(|a| a == "--threads")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(8);
    let cycles: usize = args
        .iter()
        .position(|a| a == "--cycles")
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(250);

    println!("Pawl stress test: {threads} threads x {cycles} cycles");
    println!("============================================");

    let bumps = Arc::new(AtomicU64::new(0));
    let bump = {
        let bumps = Arc::clone(&bumps);
        move |scope: &mut TransitionScope, _args: &ArgMap| {
            bumps.fetch_add(1, Ordering::SeqCst);
            let next = scope
                .resolve("rallies")
                .and_then(|r| r.as_value())
                .and_then(Value::as_int)
                .unwrap_or(0)
                + 1;
            scope.set_persistent("rallies", Value::Int(next));
            Ok(())
        }
    };
    let registry = ProviderRegistry::builder().function_fn("bump", bump).build();

    let store = Arc::new(MemoryStore::new());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn WorkflowStore>,
        registry,
    )
    .with_graph(relay_graph());

    let instance = engine
        .initialize(&WorkflowName::from("relay"), TransitionRequest::new("serve"))
        .expect("serve")
        .instance;

    let started = Instant::now();
    let mut totals = Outcomes::default();
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|_| s.spawn(|| run_worker(&engine, instance, cycles)))
            .collect();
        for handle in handles {
            let outcomes = handle.join().expect("worker panicked");
            totals.done += outcomes.done;
            totals.denied += outcomes.denied;
            totals.errors += outcomes.errors;
        }
    });
    let elapsed_secs = started.elapsed().as_secs_f64();

    let record = store.read(instance).expect("read final record");
    let final_steps: Vec<StepId> = record.current_steps.iter().cloned().collect();
    let record_rallies = record
        .scope
        .get("rallies")
        .and_then(Value::as_int)
        .unwrap_or(0);

    print_report(
        threads,
        cycles,
        &totals,
        bumps.load(Ordering::SeqCst),
        record_rallies,
        &final_steps,
        elapsed_secs,
    );
}

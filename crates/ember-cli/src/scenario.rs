//! Scenarios run by the `demo` and `stress` subcommands.

use anyhow::{ensure, Context, Result};
use ember_runtime::{CallHandle, EngineConfig, PoolUsage, Runner, ScopeError, ScopeSnapshot};
use ember_types::ErrorCode;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
struct DemoReport {
    d1: Option<String>,
    d2_rejection: Option<String>,
    scopes: Vec<ScopeSnapshot>,
}

/// "main" calls "device", whose task calls back into "main".
///
/// The callback is refused because "main" is already waiting on "device";
/// "device" still completes its own task.
pub fn demo(config: &EngineConfig) -> Result<()> {
    let runner = Runner::initialize(config.clone())?;
    let main = runner.scope("main");
    let device = runner.scope("device");

    let device_h = device.clone();
    let main_h = main.clone();
    let m1 = main.call("m1", move || {
        let d1 = device_h.call("d1", move || {
            let rejection = main_h.call("d2", || ()).err();
            ("device reading: 42".to_string(), rejection)
        })?;
        d1.wait()
    })?;

    let (d1_value, rejection) = m1
        .wait()?
        .context("m1 was cancelled")??
        .context("d1 was cancelled")?;

    println!("d1 completed: {d1_value}");
    match rejection {
        Some(ref err) => println!("d2 rejected: [{}] {err}", err.code()),
        None => println!("d2 was accepted"),
    }

    // Same-scope call from inside "main" runs inline.
    let main_h = main.clone();
    let inline = main.call("m2", move || main_h.call("m3", || "inline").and_then(|h| h.wait()))?;
    if let Some(Ok(Some(value))) = inline.wait()? {
        println!("m3 ran {value} on main");
    }

    let report = DemoReport {
        d1: Some(d1_value),
        d2_rejection: rejection.map(|e| e.code().to_string()),
        scopes: runner.snapshot(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    runner.release();
    Ok(())
}

#[derive(Debug, Serialize)]
struct StressSummary {
    scopes: usize,
    tasks_per_scope: usize,
    completed: usize,
    nested_calls: usize,
    cancelled: usize,
    fifo_ok: bool,
    elapsed_ms: u64,
    pool: Option<PoolUsage>,
}

/// Submits `tasks` calls to each of `scopes` scopes. Every task but those on
/// the last scope makes a nested call into the next scope.
pub fn stress(config: &EngineConfig, scopes: usize, tasks: usize) -> Result<()> {
    ensure!(scopes > 0, "--scopes must be at least 1");

    let runner = Runner::initialize(config.clone())?;
    let scope_handles: Vec<_> = (0..scopes)
        .map(|i| runner.scope(format!("stress-{i}")))
        .collect();
    let counters: Vec<Arc<AtomicUsize>> =
        (0..scopes).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let nested = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let mut pending: Vec<(usize, CallHandle<Result<usize, ScopeError>>)> =
        Vec::with_capacity(scopes * tasks);
    for seq in 0..tasks {
        for (i, scope) in scope_handles.iter().enumerate() {
            let counter = Arc::clone(&counters[i]);
            let neighbour = scope_handles.get(i + 1).cloned();
            let nested = Arc::clone(&nested);
            let handle = scope.call(format!("t{seq}"), move || -> Result<usize, ScopeError> {
                let position = counter.fetch_add(1, Ordering::SeqCst);
                if let Some(neighbour) = neighbour {
                    neighbour.call("nested", || ())?.wait()?;
                    nested.fetch_add(1, Ordering::SeqCst);
                }
                Ok(position)
            })?;
            pending.push((seq, handle));
        }
    }
    debug!(submitted = pending.len(), "stress tasks submitted");

    let mut completed = 0;
    let mut cancelled = 0;
    let mut fifo_ok = true;
    for (seq, handle) in pending {
        match handle.wait()? {
            Some(position) => {
                completed += 1;
                fifo_ok &= position? == seq;
            }
            None => cancelled += 1,
        }
    }

    let summary = StressSummary {
        scopes,
        tasks_per_scope: tasks,
        completed,
        nested_calls: nested.load(Ordering::SeqCst),
        cancelled,
        fifo_ok,
        elapsed_ms: started.elapsed().as_millis() as u64,
        pool: runner.pool_usage(),
    };
    info!(completed, elapsed_ms = summary.elapsed_ms, "stress run finished");
    println!("{}", serde_json::to_string_pretty(&summary)?);

    runner.release();
    ensure!(fifo_ok, "tasks ran out of submission order");
    ensure!(cancelled == 0, "{cancelled} task(s) were cancelled");
    Ok(())
}

//! Integration tests for the scope engine.
//!
//! Exercises the engine through its public API with real worker threads:
//! - FIFO execution within a scope
//! - Same-scope inlining and cross-scope cycle rejection
//! - Cancellation on stop and release
//! - Registry singletons and idle auto-stop under contention

use ember_runtime::{
    current_scope, EngineConfig, ErrorCode, ResultState, Runner, ScopeError, ScopeName,
    ScopeState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// =============================================================================
// Test Fixtures
// =============================================================================

const TIMEOUT: Duration = Duration::from_secs(10);

fn runner() -> Runner {
    Runner::initialize(EngineConfig::default()).unwrap()
}

fn names(list: &[&str]) -> Vec<ScopeName> {
    list.iter().map(ScopeName::new).collect()
}

/// Task body that signals it started, then blocks until the gate opens.
fn gated() -> (
    impl FnOnce() + Send + 'static,
    mpsc::Receiver<()>,
    mpsc::Sender<()>,
) {
    let (started_tx, started_rx) = mpsc::channel();
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let body = move || {
        let _ = started_tx.send(());
        let _ = gate_rx.recv();
    };
    (body, started_rx, gate_tx)
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn fifo_across_submitting_threads() {
    let runner = runner();
    let scope = runner.scope("fifo");
    let submit_lock = Arc::new(Mutex::new(0usize));
    let executed = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let scope = scope.clone();
            let submit_lock = Arc::clone(&submit_lock);
            let executed = Arc::clone(&executed);
            thread::spawn(move || {
                for _ in 0..50 {
                    let mut next = submit_lock.lock().unwrap();
                    let id = *next;
                    *next += 1;
                    let executed = Arc::clone(&executed);
                    scope
                        .run(format!("t{id}"), move || executed.lock().unwrap().push(id))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let barrier = scope.call("barrier", || ()).unwrap();
    barrier.wait_timeout(TIMEOUT).unwrap();

    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed, (0..200).collect::<Vec<_>>());
    runner.release();
}

#[test]
fn run_and_call_share_one_queue() {
    let runner = runner();
    let scope = runner.scope("mixed");
    let log = Arc::new(Mutex::new(Vec::new()));

    let l = Arc::clone(&log);
    scope.run("r1", move || l.lock().unwrap().push("r1")).unwrap();
    let l = Arc::clone(&log);
    let c1 = scope.call("c1", move || l.lock().unwrap().push("c1")).unwrap();
    let l = Arc::clone(&log);
    scope.run("r2", move || l.lock().unwrap().push("r2")).unwrap();
    let l = Arc::clone(&log);
    let c2 = scope.call("c2", move || l.lock().unwrap().push("c2")).unwrap();

    c2.wait_timeout(TIMEOUT).unwrap();
    c1.wait_timeout(TIMEOUT).unwrap();
    assert_eq!(*log.lock().unwrap(), ["r1", "c1", "r2", "c2"]);
    runner.release();
}

// =============================================================================
// Same-scope inlining
// =============================================================================

#[test]
fn same_scope_call_runs_inline_despite_queue() {
    let runner = runner();
    let scope = runner.scope("self");
    let inner_scope = scope.clone();
    let (tx, rx) = mpsc::channel();

    let outer = scope
        .call("outer", move || {
            // Fill the queue behind us; an inline call must not wait for it.
            for i in 0..5 {
                inner_scope.run(format!("later{i}"), || {}).unwrap();
            }
            let inner = inner_scope.call("inner", current_scope).unwrap();
            tx.send(inner.is_ready()).unwrap();
            inner.wait().unwrap().flatten()
        })
        .unwrap();

    assert!(rx.recv_timeout(TIMEOUT).unwrap(), "inline result not ready");
    let seen = outer.wait_timeout(TIMEOUT).unwrap().flatten();
    assert_eq!(seen, Some(ScopeName::new("self")));
    assert_eq!(scope.snapshot().stats.inline_calls, 1);
    runner.release();
}

#[test]
fn external_threads_have_no_current_scope() {
    assert_eq!(current_scope(), None);
    let runner = runner();
    let device = runner.scope("device");
    let inside = device.call("who", current_scope).unwrap();
    assert_eq!(
        inside.wait_timeout(TIMEOUT).unwrap().flatten(),
        Some(ScopeName::new("device"))
    );
    assert!(!device.is_current());
    runner.release();
}

// =============================================================================
// Cycle rejection
// =============================================================================

#[test]
fn main_device_main_is_rejected() {
    let runner = runner();
    let main = runner.scope("main");
    let device = runner.scope("device");

    let device_h = device.clone();
    let main_h = main.clone();
    let m1 = main
        .call("m1", move || {
            let d1 = device_h
                .call("d1", move || {
                    let rejected = main_h.call("d2", || ()).err();
                    (rejected, "d1 done")
                })
                .unwrap();
            d1.wait()
        })
        .unwrap();

    let (rejected, d1_value) = m1
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(d1_value, "d1 done");
    let err = rejected.unwrap();
    assert_eq!(err.code(), "SCOPE_DEADLOCK_AVOIDED");
    assert_eq!(
        err,
        ScopeError::DeadlockAvoided {
            target: ScopeName::new("main"),
            chain: names(&["main", "device"]),
        }
    );
    assert_eq!(main.queued(), 0);
    runner.release();
}

#[test]
fn indirect_cycle_is_rejected() {
    let runner = runner();
    let (a, b, c) = (runner.scope("a"), runner.scope("b"), runner.scope("c"));

    let (b2, c2, a2) = (b.clone(), c.clone(), a.clone());
    let top = a
        .call("a1", move || {
            b2.call("b1", move || {
                c2.call("c1", move || a2.call("a2", || ()).err())
                    .and_then(|h| h.wait())
            })
            .and_then(|h| h.wait())
        })
        .unwrap();

    let err = top
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(err.is_deadlock_avoidance());
    assert!(matches!(
        err,
        ScopeError::DeadlockAvoided { ref chain, .. } if *chain == names(&["a", "b", "c"])
    ));
    runner.release();
}

#[test]
fn independent_chains_into_one_target_are_legal() {
    let runner = runner();
    let target = runner.scope("target");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = ["left", "right"]
        .into_iter()
        .map(|caller| {
            let target = target.clone();
            let barrier = Arc::clone(&barrier);
            runner
                .scope(caller)
                .call(format!("{caller}-outer"), move || {
                    barrier.wait();
                    target
                        .call(format!("{caller}-inner"), move || caller.len())
                        .and_then(|h| h.wait())
                })
                .unwrap()
        })
        .collect();

    let lens: Vec<usize> = handles
        .iter()
        .map(|h| h.wait_timeout(TIMEOUT).unwrap().unwrap().unwrap().unwrap())
        .collect();
    assert_eq!(lens, [4, 5]);
    runner.release();
}

#[test]
fn chain_longer_than_max_depth_is_rejected() {
    let config = EngineConfig::default().with_max_call_depth(2);
    let runner = Runner::initialize(config).unwrap();
    let s: Vec<_> = (0..4).map(|i| runner.scope(format!("s{i}"))).collect();

    let (s1, s2, s3) = (s[1].clone(), s[2].clone(), s[3].clone());
    let top = s[0]
        .call("l0", move || {
            s1.call("l1", move || {
                s2.call("l2", move || s3.call("l3", || ()).err())
                    .and_then(|h| h.wait())
            })
            .and_then(|h| h.wait())
        })
        .unwrap();

    let err = top
        .wait_timeout(TIMEOUT)
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        err,
        ScopeError::CallDepthExceeded {
            target: ScopeName::new("s3"),
            depth: 3,
            max: 2,
        }
    );
    runner.release();
}

#[test]
fn run_is_never_rejected_for_cycles() {
    let runner = runner();
    let ping = runner.scope("ping");
    let pong = runner.scope("pong");
    let (tx, rx) = mpsc::channel();

    let pong_h = pong.clone();
    let ping_h = ping.clone();
    ping.run("serve", move || {
        pong_h
            .run("return", move || {
                ping_h.run("back", move || tx.send("home").unwrap()).unwrap();
            })
            .unwrap();
    })
    .unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), "home");
    runner.release();
}

// =============================================================================
// Waiting diagnostics
// =============================================================================

#[test]
fn blocked_caller_shows_waiting_edge() {
    let runner = runner();
    let main = runner.scope("main");
    let device = runner.scope("device");
    let (body, started, gate) = gated();

    let device_h = device.clone();
    let m1 = main
        .call("m1", move || device_h.call("slow", body).and_then(|h| h.wait()))
        .unwrap();

    started.recv_timeout(TIMEOUT).unwrap();
    wait_until("main to wait", || main.state() == ScopeState::Waiting);

    let graph = runner.registry().wait_graph();
    assert_eq!(graph.len(), 1);
    assert_eq!(graph[0].from, ScopeName::new("main"));
    assert_eq!(graph[0].to, ScopeName::new("device"));

    let snap = main.snapshot();
    assert_eq!(snap.current_task.as_deref(), Some("m1"));
    assert_eq!(snap.waiting_on, Some(ScopeName::new("device")));
    let device_snap = device.snapshot();
    assert_eq!(device_snap.state, ScopeState::Running);
    assert_eq!(
        device_snap.call_stack.map(|s| s.frames().to_vec()),
        Some(names(&["main"]))
    );

    gate.send(()).unwrap();
    assert!(m1.wait_timeout(TIMEOUT).unwrap().unwrap().is_ok());
    wait_until("main to settle", || main.state() == ScopeState::Empty);
    assert!(runner.registry().wait_graph().is_empty());
    runner.release();
}

// =============================================================================
// Cancellation
// =============================================================================

#[test]
fn stop_cancels_every_queued_handle() {
    let runner = runner();
    let scope = runner.scope("busy");
    let (body, started, gate) = gated();
    scope.run("blocker", body).unwrap();
    started.recv_timeout(TIMEOUT).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| scope.call(format!("q{i}"), move || i).unwrap())
        .collect();
    assert_eq!(scope.queued(), 8);

    let woken = Arc::new(AtomicUsize::new(0));
    let waiters: Vec<_> = handles
        .into_iter()
        .map(|handle| {
            let woken = Arc::clone(&woken);
            thread::spawn(move || {
                let result = handle.wait_timeout(TIMEOUT);
                woken.fetch_add(1, Ordering::SeqCst);
                result
            })
        })
        .collect();

    let stopper = {
        let scope = scope.clone();
        thread::spawn(move || scope.stop())
    };
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap().unwrap(), None);
    }
    assert_eq!(woken.load(Ordering::SeqCst), 8);

    gate.send(()).unwrap();
    assert_eq!(stopper.join().unwrap(), 8);
    assert_eq!(scope.state(), ScopeState::Idle);
    runner.release();
}

#[test]
fn stop_from_inside_scope_finishes_running_task() {
    let runner = runner();
    let scope = runner.scope("selfstop");
    let (gate_tx, gate_rx) = mpsc::channel::<()>();

    let me = scope.clone();
    let first = scope
        .call("first", move || {
            let _ = gate_rx.recv();
            me.stop()
        })
        .unwrap();
    let second = scope.call("second", || "never").unwrap();
    gate_tx.send(()).unwrap();

    assert_eq!(first.wait_timeout(TIMEOUT).unwrap(), Some(1));
    assert_eq!(second.wait_timeout(TIMEOUT).unwrap(), None);
    wait_until("scope to go idle", || scope.state() == ScopeState::Idle);

    let third = scope.call("third", || "restarted").unwrap();
    assert_eq!(third.wait_timeout(TIMEOUT).unwrap(), Some("restarted"));
    runner.release();
}

#[test]
fn release_cancels_queue_and_closes_scopes() {
    let runner = runner();
    let main = runner.scope("main");
    let device = runner.scope("device");
    let (body, started, gate) = gated();
    device.run("blocker", body).unwrap();
    started.recv_timeout(TIMEOUT).unwrap();

    // main blocks on a task stuck behind the blocker.
    let device_h = device.clone();
    let m1 = main
        .call("m1", move || device_h.call("queued", || 1).and_then(|h| h.wait()))
        .unwrap();
    wait_until("queued task", || device.queued() == 1);

    let opener = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = gate.send(());
    });
    let registry = runner.registry().clone();
    let report = runner.release();
    opener.join().unwrap();

    assert_eq!(report.scopes, 2);
    assert!(report.cancelled >= 1);
    assert_eq!(m1.wait_timeout(TIMEOUT).unwrap(), Some(Ok(None)));

    let err = registry.scope("main").run("late", || {}).unwrap_err();
    assert_eq!(err.code(), "SCOPE_CLOSED");
    let err = registry.scope("fresh").call("late", || ()).unwrap_err();
    assert_eq!(
        err,
        ScopeError::Closed {
            scope: ScopeName::new("fresh")
        }
    );
}

// =============================================================================
// Registry & lifecycle
// =============================================================================

#[test]
fn concurrent_first_use_starts_one_worker() {
    let runner = runner();
    let registry = runner.registry().clone();
    let barrier = Arc::new(Barrier::new(16));

    let threads: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                registry
                    .scope("x")
                    .call(format!("t{i}"), move || {
                        thread::current().name().map(str::to_string)
                    })
                    .unwrap()
                    .wait_timeout(TIMEOUT)
                    .unwrap()
                    .flatten()
            })
        })
        .collect();

    for t in threads {
        assert_eq!(t.join().unwrap().as_deref(), Some("scope:x"));
    }
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.scope("x").snapshot().stats.starts, 1);
    runner.release();
}

#[test]
fn idle_auto_stop_never_loses_tasks() {
    let config = EngineConfig::default()
        .with_idle_timeout(Duration::from_millis(1))
        .with_manager_interval(Duration::from_millis(1));
    let runner = Runner::initialize(config).unwrap();
    let scope = runner.scope("flappy");

    let done = Arc::new(AtomicUsize::new(0));
    let observer = {
        let registry = runner.registry().clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while done.load(Ordering::SeqCst) == 0 {
                for s in registry.scopes() {
                    let _ = s.snapshot();
                }
                thread::yield_now();
            }
        })
    };

    for i in 0..200u64 {
        if i % 3 == 0 {
            thread::sleep(Duration::from_micros(900 + (i % 7) * 100));
        }
        let handle = scope.call(format!("t{i}"), move || i).unwrap();
        assert_eq!(handle.wait_timeout(TIMEOUT).unwrap(), Some(i));
    }

    done.store(1, Ordering::SeqCst);
    observer.join().unwrap();

    wait_until("counters to settle", || scope.snapshot().stats.executed == 200);
    let stats = scope.snapshot().stats;
    assert_eq!(stats.executed, 200);
    assert_eq!(stats.cancelled, 0);
    assert!(stats.starts >= 1);
    runner.release();
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn panicking_task_reports_failure_and_worker_continues() {
    let runner = runner();
    let scope = runner.scope("fragile");

    let bad = scope
        .call("bad", || -> i32 { panic!("sensor offline") })
        .unwrap();
    let good = scope.call("good", || 3).unwrap();

    let err = bad.wait_timeout(TIMEOUT).unwrap_err();
    assert_eq!(
        err,
        ScopeError::TaskFailed {
            task: "bad".to_string(),
            message: "sensor offline".to_string(),
        }
    );
    assert_eq!(bad.state(), ResultState::Consumed);
    assert_eq!(good.wait_timeout(TIMEOUT).unwrap(), Some(3));
    runner.release();
}

#[test]
fn double_wait_is_rejected() {
    let runner = runner();
    let handle = runner.scope("once").call("v", || 9).unwrap();
    assert_eq!(handle.wait_timeout(TIMEOUT).unwrap(), Some(9));
    let err = handle.wait().unwrap_err();
    assert_eq!(err.code(), "SCOPE_ALREADY_CONSUMED");
    runner.release();
}

#[test]
fn bounded_wait_leaves_handle_usable() {
    let runner = runner();
    let scope = runner.scope("slow");
    let (body, started, gate) = gated();
    scope.run("blocker", body).unwrap();
    started.recv_timeout(TIMEOUT).unwrap();

    let handle = scope.call("later", || "ok").unwrap();
    let err = handle.wait_timeout(Duration::from_millis(10)).unwrap_err();
    assert!(err.is_recoverable());
    assert_eq!(handle.state(), ResultState::Pending);

    gate.send(()).unwrap();
    assert_eq!(handle.wait_timeout(TIMEOUT).unwrap(), Some("ok"));
    runner.release();
}

#[test]
fn exhausted_pool_fails_submission() {
    let config = EngineConfig::default().with_pool_capacity(1);
    let runner = Runner::initialize(config).unwrap();
    let scope = runner.scope("tiny");

    let err = scope.run("big", || {}).unwrap_err();
    assert!(matches!(
        err,
        ScopeError::PoolExhausted { ref tag, .. } if tag == "tiny"
    ));
    assert_eq!(scope.state(), ScopeState::Idle);
    assert_eq!(runner.pool_usage().unwrap().in_use_bytes, 0);
    runner.release();
}

#[test]
fn full_queue_rejects_and_cancels() {
    let config = EngineConfig::default().with_queue_capacity(2);
    let runner = Runner::initialize(config).unwrap();
    let scope = runner.scope("bounded");
    let (body, started, gate) = gated();
    scope.run("blocker", body).unwrap();
    started.recv_timeout(TIMEOUT).unwrap();

    let kept: Vec<_> = (0..2)
        .map(|i| scope.call(format!("k{i}"), move || i).unwrap())
        .collect();
    let err = scope.call("overflow", || 99).unwrap_err();
    assert_eq!(
        err,
        ScopeError::QueueFull {
            scope: ScopeName::new("bounded"),
            capacity: 2,
        }
    );

    gate.send(()).unwrap();
    let values: Vec<_> = kept
        .iter()
        .map(|h| h.wait_timeout(TIMEOUT).unwrap())
        .collect();
    assert_eq!(values, [Some(0), Some(1)]);
    runner.release();
}

#[test]
fn worker_spawn_failure_fails_submission() {
    let config = EngineConfig {
        worker_stack_size: usize::MAX / 2,
        ..EngineConfig::default()
    };
    let runner = Runner::initialize(config).unwrap();
    let scope = runner.scope("huge");

    let err = scope.call("never", || 1).unwrap_err();
    assert!(matches!(
        err,
        ScopeError::WorkerSpawn { ref scope, .. } if scope.as_str() == "huge"
    ));
    assert!(err.is_recoverable());
    assert_eq!(scope.state(), ScopeState::Idle);
    assert_eq!(scope.snapshot().stats.starts, 0);
    assert_eq!(runner.pool_usage().unwrap().live_slots, 0);
    runner.release();
}

#[test]
fn invalid_config_is_rejected_at_initialize() {
    let err = Runner::initialize(EngineConfig::default().with_max_call_depth(0)).unwrap_err();
    assert_eq!(err.code(), "SCOPE_INVALID_CONFIG");
    assert!(err.to_string().contains("engine.max_call_depth"));
}

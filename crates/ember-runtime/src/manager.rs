//! ScopeManager - idle supervision thread.
//!
//! The manager sweeps the [`Registry`] periodically, stopping scopes that
//! have sat `EMPTY` past the idle timeout and reporting scopes that have been
//! `WAITING` suspiciously long. Workers also stop themselves when idle; the
//! sweep catches workers that have not woken up yet.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                     ScopeManager                      │
//! │                                                       │
//! │  ┌──────────────────┐    ┌─────────────────────────┐  │
//! │  │ command rx       │───►│ recv_timeout(interval)  │  │
//! │  │ (mpsc::Receiver) │    │ - Sweep    → reply      │  │
//! │  └──────────────────┘    │ - Shutdown → exit       │  │
//! │                          │ - timeout  → sweep      │  │
//! │                          └────────────┬────────────┘  │
//! │                                       ▼               │
//! │                          ┌─────────────────────────┐  │
//! │                          │ Registry                │  │
//! │                          │ - stop_if_idle          │  │
//! │                          │ - wait_graph            │  │
//! │                          └─────────────────────────┘  │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::error::ScopeError;
use crate::registry::Registry;
use crate::snapshot::SweepReport;
use ember_types::ScopeName;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Thread name of the supervision thread.
const MANAGER_THREAD_NAME: &str = "ember-manager";

/// Commands accepted by the manager thread.
#[derive(Debug)]
pub(crate) enum ManagerCommand {
    /// Sweep now and send the report back.
    Sweep { reply: mpsc::Sender<SweepReport> },
    /// Exit the loop.
    Shutdown,
}

/// Owner side of a running manager thread.
#[derive(Debug)]
pub(crate) struct ManagerHandle {
    tx: mpsc::Sender<ManagerCommand>,
    thread: Option<JoinHandle<()>>,
}

impl ManagerHandle {
    /// Runs a sweep on the manager thread and returns its report.
    ///
    /// Returns `None` if the manager has already exited.
    pub(crate) fn sweep(&self) -> Option<SweepReport> {
        let (reply, rx) = mpsc::channel();
        self.tx.send(ManagerCommand::Sweep { reply }).ok()?;
        rx.recv().ok()
    }

    /// Stops the loop and joins the thread.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.tx.send(ManagerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("scope manager thread panicked");
            }
        }
    }
}

impl Drop for ManagerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Idle-timeout supervisor.
pub(crate) struct ScopeManager {
    registry: Registry,
    rx: mpsc::Receiver<ManagerCommand>,
}

impl ScopeManager {
    /// Starts the manager thread for `registry`.
    pub(crate) fn spawn(registry: Registry) -> Result<ManagerHandle, ScopeError> {
        let (tx, rx) = mpsc::channel();
        let manager = Self { registry, rx };
        let thread = thread::Builder::new()
            .name(MANAGER_THREAD_NAME.to_string())
            .spawn(move || manager.run())
            .map_err(|e| {
                error!(error = %e, "failed to spawn scope manager");
                ScopeError::WorkerSpawn {
                    scope: ScopeName::new(MANAGER_THREAD_NAME),
                    reason: e.to_string(),
                }
            })?;
        Ok(ManagerHandle {
            tx,
            thread: Some(thread),
        })
    }

    fn run(self) {
        let interval = self.registry.config().manager_interval();
        info!(interval_ms = interval.as_millis() as u64, "scope manager started");

        loop {
            match self.rx.recv_timeout(interval) {
                Ok(ManagerCommand::Sweep { reply }) => {
                    let _ = reply.send(sweep(&self.registry));
                }
                Ok(ManagerCommand::Shutdown) => {
                    info!("scope manager received shutdown");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    sweep(&self.registry);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!("scope manager stopped");
    }
}

/// One supervision pass over every scope.
pub(crate) fn sweep(registry: &Registry) -> SweepReport {
    let mut report = SweepReport::default();
    let config = registry.config();

    if let Some(limit) = config.idle_timeout() {
        for scope in registry.scopes() {
            if scope.stop_if_idle(limit) {
                debug!(scope = %scope.name(), "manager stopped idle scope");
                report.idle_stopped.push(scope.name().clone());
            }
        }
    }

    if let Some(threshold) = config.wait_warn() {
        let threshold_ms = threshold.as_millis() as u64;
        for edge in registry.wait_graph() {
            if edge.waited_ms >= threshold_ms {
                warn!(
                    from = %edge.from,
                    to = %edge.to,
                    waited_ms = edge.waited_ms,
                    "scope waiting unusually long"
                );
                report.long_waits.push(edge);
            }
        }
    }

    report
}

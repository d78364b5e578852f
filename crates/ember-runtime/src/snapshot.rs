//! Serializable diagnostics.
//!
//! Snapshots are copies taken under the owning lock; they never hold
//! references into live engine state.

use crate::call_stack::CallStack;
use crate::state::ScopeState;
use ember_types::ScopeName;
use serde::Serialize;

/// Lifetime counters of a scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScopeStats {
    /// Tasks that ran to completion on the worker.
    pub executed: u64,
    /// Tasks whose callable panicked.
    pub failed: u64,
    /// Tasks discarded without running.
    pub cancelled: u64,
    /// Same-scope calls executed inline.
    pub inline_calls: u64,
    /// Worker threads started.
    pub starts: u64,
    /// Workers stopped for idleness.
    pub idle_stops: u64,
}

/// Point-in-time view of one scope.
///
/// # Example
///
/// ```
/// use ember_runtime::{EngineConfig, Runner, ScopeState};
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let snap = runner.scope("device").snapshot();
/// assert_eq!(snap.state, ScopeState::Idle);
/// assert_eq!(snap.queued, 0);
///
/// let json = serde_json::to_value(&snap).unwrap();
/// assert_eq!(json["state"], "IDLE");
/// runner.release();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSnapshot {
    pub name: ScopeName,
    pub state: ScopeState,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Task the worker is executing, if any.
    pub current_task: Option<String>,
    /// Call stack of the executing task.
    pub call_stack: Option<CallStack>,
    /// Scope this one is blocked on while WAITING.
    pub waiting_on: Option<ScopeName>,
    /// How long the current wait has lasted.
    pub waiting_ms: Option<u64>,
    /// Set once the runner has been released.
    pub closed: bool,
    pub stats: ScopeStats,
}

/// A live `caller -> target` dependency between two scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitEdge {
    pub from: ScopeName,
    pub to: ScopeName,
    pub waited_ms: u64,
}

/// Outcome of one supervision sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Scopes driven from EMPTY to IDLE.
    pub idle_stopped: Vec<ScopeName>,
    /// WAITING edges older than the warning threshold.
    pub long_waits: Vec<WaitEdge>,
}

impl SweepReport {
    /// Returns `true` if the sweep changed or reported nothing.
    #[must_use]
    pub fn is_quiet(&self) -> bool {
        self.idle_stopped.is_empty() && self.long_waits.is_empty()
    }
}

/// Summary of [`Runner::release`](crate::Runner::release).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseReport {
    /// Scopes closed.
    pub scopes: usize,
    /// Queued tasks cancelled across all scopes.
    pub cancelled: usize,
}

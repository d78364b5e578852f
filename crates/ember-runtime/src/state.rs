//! Scope lifecycle states.
//!
//! ```text
//!  Idle ──submit──▶ Empty ──push──▶ Ready ──dequeue──▶ Running ──call+wait──▶ Waiting
//!   ▲                 ▲               ▲                  │  ▲                    │
//!   │                 └──queue empty──┼──────────────────┤  └───────woken────────┘
//!   │                                 └───more queued────┘
//!   │
//!  Stopping ◀── idle timeout (from Empty), explicit stop (from any active state)
//! ```

use serde::Serialize;
use std::fmt;

/// State of a [`Scope`](crate::Scope).
///
/// # Transitions
///
/// | From | To | Trigger |
/// |------|----|---------|
/// | Idle | Empty | first submission starts the worker |
/// | Empty | Ready | task pushed to the empty queue |
/// | Ready | Running | worker dequeues a task |
/// | Running | Waiting | running task blocks on a cross-scope call |
/// | Waiting | Running | the awaited call settles |
/// | Running | Empty / Ready | task finished; queue empty / not empty |
/// | any but Idle | Stopping | idle timeout or explicit stop |
/// | Stopping | Idle | queue drained, worker exits |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeState {
    /// No worker thread exists.
    Idle,
    /// Worker alive, queue empty.
    Empty,
    /// Queue non-empty, worker has not picked the next task up yet.
    Ready,
    /// Worker is executing a task.
    Running,
    /// The running task is blocked inside a call into another scope.
    Waiting,
    /// Shutting down; remaining tasks are cancelled.
    Stopping,
}

impl ScopeState {
    /// Returns `true` while a worker thread is attached.
    #[must_use]
    pub fn has_worker(self) -> bool {
        !matches!(self, Self::Idle)
    }

    /// Returns `true` while a task is executing (including blocked in a call).
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }

    /// Returns `true` if `next` is a legal successor of `self`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ScopeState::*;
        match (self, next) {
            (Idle, Empty)
            | (Empty, Ready)
            | (Ready, Running)
            | (Running, Waiting)
            | (Waiting, Running)
            | (Running, Empty)
            | (Running, Ready)
            | (Stopping, Idle) => true,
            (from, Stopping) => from != Idle && from != Stopping,
            _ => false,
        }
    }

    /// Upper-case label used in logs and snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Empty => "EMPTY",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Stopping => "STOPPING",
        }
    }
}

impl fmt::Display for ScopeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ScopeState::*;

    const ALL: [ScopeState; 6] = [Idle, Empty, Ready, Running, Waiting, Stopping];

    #[test]
    fn documented_transitions_are_legal() {
        for (from, to) in [
            (Idle, Empty),
            (Empty, Ready),
            (Ready, Running),
            (Running, Waiting),
            (Waiting, Running),
            (Running, Empty),
            (Running, Ready),
            (Empty, Stopping),
            (Stopping, Idle),
        ] {
            assert!(from.can_transition_to(to), "{from} -> {to}");
        }
    }

    #[test]
    fn every_active_state_can_stop() {
        for from in ALL {
            let expected = !matches!(from, Idle | Stopping);
            assert_eq!(from.can_transition_to(Stopping), expected, "{from}");
        }
    }

    #[test]
    fn shortcuts_are_illegal() {
        assert!(!Idle.can_transition_to(Running));
        assert!(!Empty.can_transition_to(Running));
        assert!(!Waiting.can_transition_to(Empty));
        assert!(!Stopping.can_transition_to(Empty));
        assert!(!Ready.can_transition_to(Idle));
    }

    #[test]
    fn worker_presence() {
        assert!(!Idle.has_worker());
        assert!(Stopping.has_worker());
        assert!(Waiting.is_busy());
        assert!(!Ready.is_busy());
    }

    #[test]
    fn serializes_upper_case() {
        assert_eq!(serde_json::to_string(&Waiting).unwrap(), "\"WAITING\"");
        assert_eq!(Stopping.to_string(), "STOPPING");
    }
}

//! Scope engine errors.
//!
//! All errors implement [`ErrorCode`] for standardized handling.
//!
//! # Error Codes
//!
//! | Variant | Code | Recoverable |
//! |---------|------|-------------|
//! | [`ScopeError::DeadlockAvoided`] | `SCOPE_DEADLOCK_AVOIDED` | No |
//! | [`ScopeError::CallDepthExceeded`] | `SCOPE_CALL_DEPTH_EXCEEDED` | No |
//! | [`ScopeError::AlreadyConsumed`] | `SCOPE_ALREADY_CONSUMED` | No |
//! | [`ScopeError::TaskFailed`] | `SCOPE_TASK_FAILED` | No |
//! | [`ScopeError::WaitTimeout`] | `SCOPE_WAIT_TIMEOUT` | Yes |
//! | [`ScopeError::WorkerSpawn`] | `SCOPE_WORKER_SPAWN` | Yes |
//! | [`ScopeError::PoolExhausted`] | `SCOPE_POOL_EXHAUSTED` | Yes |
//! | [`ScopeError::QueueFull`] | `SCOPE_QUEUE_FULL` | Yes |
//! | [`ScopeError::Stopping`] | `SCOPE_STOPPING` | Yes |
//! | [`ScopeError::Closed`] | `SCOPE_CLOSED` | No |
//! | [`ScopeError::InvalidConfig`] | `SCOPE_INVALID_CONFIG` | No |
//!
//! Cancellation is not an error: a cancelled call yields `Ok(None)` from
//! [`CallHandle::wait`](crate::CallHandle::wait).

use ember_types::{ErrorCode, ScopeName};
use thiserror::Error;

/// Scope engine error.
///
/// # Example
///
/// ```
/// use ember_runtime::ScopeError;
/// use ember_types::{ErrorCode, ScopeName};
///
/// let err = ScopeError::Closed { scope: ScopeName::new("device") };
/// assert_eq!(err.code(), "SCOPE_CLOSED");
/// assert!(!err.is_recoverable());
/// ```
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScopeError {
    /// The target scope is already waiting, transitively, on the caller.
    ///
    /// `chain` is the live call chain at the point of rejection, outermost
    /// scope first, ending with the scope that issued the call.
    #[error("deadlock avoided: call into '{target}' from chain [{}]", join(.chain))]
    DeadlockAvoided {
        /// Scope the rejected call was aimed at.
        target: ScopeName,
        /// Scopes already on the synchronous call chain.
        chain: Vec<ScopeName>,
    },

    /// The synchronous call chain would grow past the configured depth.
    #[error("call depth exceeded calling '{target}': depth {depth} > max {max}")]
    CallDepthExceeded {
        /// Scope the rejected call was aimed at.
        target: ScopeName,
        /// Depth the chain would have reached.
        depth: usize,
        /// Configured limit.
        max: usize,
    },

    /// `wait()` was called on a handle whose result was already taken.
    #[error("result of task '{task}' was already consumed")]
    AlreadyConsumed {
        /// Task name.
        task: String,
    },

    /// The task callable panicked.
    #[error("task '{task}' failed: {message}")]
    TaskFailed {
        /// Task name.
        task: String,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A bounded wait expired while the task was still pending.
    ///
    /// The handle is not consumed and may be waited on again.
    #[error("timed out waiting for task '{task}'")]
    WaitTimeout {
        /// Task name.
        task: String,
    },

    /// The scope worker thread could not be started.
    #[error("failed to start worker for scope '{scope}': {reason}")]
    WorkerSpawn {
        /// Scope whose worker failed to start.
        scope: ScopeName,
        /// OS error text.
        reason: String,
    },

    /// The slot allocator refused the task's storage.
    #[error("slot pool exhausted for '{tag}' ({requested} bytes requested)")]
    PoolExhausted {
        /// Allocation tag (scope name).
        tag: String,
        /// Bytes requested.
        requested: usize,
    },

    /// The scope queue reached its configured capacity.
    #[error("queue of scope '{scope}' is full (capacity {capacity})")]
    QueueFull {
        /// Scope whose queue is full.
        scope: ScopeName,
        /// Configured capacity.
        capacity: usize,
    },

    /// The scope is being stopped; the submitted task was cancelled.
    #[error("scope '{scope}' is stopping")]
    Stopping {
        /// Scope being stopped.
        scope: ScopeName,
    },

    /// The runner was released; the scope no longer accepts work.
    #[error("scope '{scope}' is closed")]
    Closed {
        /// Closed scope.
        scope: ScopeName,
    },

    /// The engine configuration failed validation at startup.
    #[error("invalid engine configuration: {reason}")]
    InvalidConfig {
        /// Validation failure.
        reason: String,
    },
}

fn join(chain: &[ScopeName]) -> String {
    chain
        .iter()
        .map(ScopeName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

impl ScopeError {
    /// Returns `true` for the deadlock-avoidance family of rejections.
    #[must_use]
    pub fn is_deadlock_avoidance(&self) -> bool {
        matches!(
            self,
            Self::DeadlockAvoided { .. } | Self::CallDepthExceeded { .. }
        )
    }
}

impl ErrorCode for ScopeError {
    fn code(&self) -> &'static str {
        match self {
            Self::DeadlockAvoided { .. } => "SCOPE_DEADLOCK_AVOIDED",
            Self::CallDepthExceeded { .. } => "SCOPE_CALL_DEPTH_EXCEEDED",
            Self::AlreadyConsumed { .. } => "SCOPE_ALREADY_CONSUMED",
            Self::TaskFailed { .. } => "SCOPE_TASK_FAILED",
            Self::WaitTimeout { .. } => "SCOPE_WAIT_TIMEOUT",
            Self::WorkerSpawn { .. } => "SCOPE_WORKER_SPAWN",
            Self::PoolExhausted { .. } => "SCOPE_POOL_EXHAUSTED",
            Self::QueueFull { .. } => "SCOPE_QUEUE_FULL",
            Self::Stopping { .. } => "SCOPE_STOPPING",
            Self::Closed { .. } => "SCOPE_CLOSED",
            Self::InvalidConfig { .. } => "SCOPE_INVALID_CONFIG",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::WaitTimeout { .. }
                | Self::WorkerSpawn { .. }
                | Self::PoolExhausted { .. }
                | Self::QueueFull { .. }
                | Self::Stopping { .. }
        )
    }
}

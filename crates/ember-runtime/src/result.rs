//! Result handle for synchronous calls.
//!
//! A call produces two halves sharing one cell:
//!
//! ```text
//!   Completer<T> ──Weak──▶ ResultCell<T> ◀──Arc── CallHandle<T>
//!   (task side)            Mutex<Slot> + Condvar   (waiter side)
//! ```
//!
//! The completer holds only a weak reference: once the waiter drops its
//! handle, settling becomes a no-op and nothing writes into freed state.
//!
//! # States
//!
//! ```text
//! Pending ──finish()──▶ Finished ──┐
//!    │                              │
//!    ├────cancel()──▶ Cancelled ────┼──wait()──▶ Consumed
//!    │                              │
//!    └────fail()────▶ Failed ───────┘
//! ```
//!
//! The first settle wins; later settles are ignored.

use crate::error::ScopeError;
use crate::worker;
use ember_types::ScopeName;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::error;

/// Observable state of a [`CallHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    /// The task has not finished yet.
    Pending,
    /// The task returned a value.
    Finished,
    /// The task was cancelled before it ran.
    Cancelled,
    /// The task panicked.
    Failed,
    /// `wait()` already took the outcome.
    Consumed,
}

enum Slot<T> {
    Pending,
    Finished(T),
    Cancelled,
    Failed(String),
    Consumed,
}

impl<T> Slot<T> {
    fn state(&self) -> ResultState {
        match self {
            Self::Pending => ResultState::Pending,
            Self::Finished(_) => ResultState::Finished,
            Self::Cancelled => ResultState::Cancelled,
            Self::Failed(_) => ResultState::Failed,
            Self::Consumed => ResultState::Consumed,
        }
    }
}

struct ResultCell<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Creates a linked completer/handle pair.
pub(crate) fn channel<T>(task: &str, target: ScopeName) -> (Completer<T>, CallHandle<T>) {
    let cell = Arc::new(ResultCell {
        slot: Mutex::new(Slot::Pending),
        ready: Condvar::new(),
    });
    let completer = Completer {
        cell: Arc::downgrade(&cell),
    };
    let handle = CallHandle {
        cell,
        task: task.to_string(),
        target,
    };
    (completer, handle)
}

/// Producer side of a call result, owned by the task.
///
/// Dropping a completer that never settled cancels the result, so a waiter
/// can never block on a task that was discarded.
pub(crate) struct Completer<T> {
    cell: Weak<ResultCell<T>>,
}

impl<T> Completer<T> {
    /// Stores the task's return value.
    pub(crate) fn finish(self, value: T) -> bool {
        self.settle(Slot::Finished(value))
    }

    /// Records a panic inside the task.
    pub(crate) fn fail(self, message: String) -> bool {
        self.settle(Slot::Failed(message))
    }

    /// Marks the task as cancelled without running it.
    pub(crate) fn cancel(self) -> bool {
        self.settle(Slot::Cancelled)
    }

    fn settle(&self, outcome: Slot<T>) -> bool {
        let Some(cell) = self.cell.upgrade() else {
            return false;
        };
        let mut slot = cell.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = outcome;
        drop(slot);
        cell.ready.notify_all();
        true
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        self.settle(Slot::Cancelled);
    }
}

/// Waiter side of a [`Scope::call`](crate::Scope::call).
///
/// Exactly one consumer: [`wait`](Self::wait) takes the outcome once. A second
/// `wait` is a contract violation reported as
/// [`ScopeError::AlreadyConsumed`].
///
/// When the waiting thread is a scope worker, the scope is shown as
/// `WAITING` on the target for the duration of the wait.
///
/// # Example
///
/// ```
/// use ember_runtime::{EngineConfig, Runner};
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let device = runner.scope("device");
///
/// let handle = device.call("answer", || 6 * 7).unwrap();
/// assert_eq!(handle.wait().unwrap(), Some(42));
/// assert!(handle.wait().is_err());
///
/// runner.release();
/// ```
pub struct CallHandle<T> {
    cell: Arc<ResultCell<T>>,
    task: String,
    target: ScopeName,
}

impl<T> CallHandle<T> {
    /// Returns the name of the task this handle belongs to.
    #[must_use]
    pub fn task_name(&self) -> &str {
        &self.task
    }

    /// Returns the scope the task was submitted to.
    #[must_use]
    pub fn target(&self) -> &ScopeName {
        &self.target
    }

    /// Returns the current state without blocking.
    #[must_use]
    pub fn state(&self) -> ResultState {
        self.cell.slot.lock().state()
    }

    /// Returns `true` once the task has settled (or the result was consumed).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() != ResultState::Pending
    }

    /// Blocks until the task settles and takes its outcome.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(value))` when the task finished
    /// - `Ok(None)` when the task was cancelled (its scope stopped)
    ///
    /// # Errors
    ///
    /// - [`ScopeError::TaskFailed`] if the task panicked
    /// - [`ScopeError::AlreadyConsumed`] on a second call
    pub fn wait(&self) -> Result<Option<T>, ScopeError> {
        self.wait_inner(None)
    }

    /// Like [`wait`](Self::wait), giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// As [`wait`](Self::wait), plus [`ScopeError::WaitTimeout`] if the task
    /// is still pending; the handle is not consumed in that case.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<T>, ScopeError> {
        self.wait_inner(Some(Instant::now() + timeout))
    }

    fn wait_inner(&self, deadline: Option<Instant>) -> Result<Option<T>, ScopeError> {
        // Only a genuine block is shown as a WAITING edge. The guard takes the
        // scope lock, so it is acquired and released outside the slot lock.
        let _waiting = if self.is_ready() {
            None
        } else {
            worker::mark_waiting(&self.target)
        };

        let mut slot = self.cell.slot.lock();
        while matches!(*slot, Slot::Pending) {
            match deadline {
                Some(deadline) => {
                    if self.cell.ready.wait_until(&mut slot, deadline).timed_out()
                        && matches!(*slot, Slot::Pending)
                    {
                        return Err(ScopeError::WaitTimeout {
                            task: self.task.clone(),
                        });
                    }
                }
                None => self.cell.ready.wait(&mut slot),
            }
        }

        let outcome = std::mem::replace(&mut *slot, Slot::Consumed);
        drop(slot);
        // Other threads blocked on this handle now see Consumed.
        self.cell.ready.notify_all();

        match outcome {
            Slot::Finished(value) => Ok(Some(value)),
            Slot::Cancelled => Ok(None),
            Slot::Failed(message) => Err(ScopeError::TaskFailed {
                task: self.task.clone(),
                message,
            }),
            Slot::Consumed | Slot::Pending => {
                error!(task = %self.task, target = %self.target, "result waited on twice");
                Err(ScopeError::AlreadyConsumed {
                    task: self.task.clone(),
                })
            }
        }
    }
}

impl<T> fmt::Debug for CallHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("task", &self.task)
            .field("target", &self.target)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn pair() -> (Completer<u32>, CallHandle<u32>) {
        channel("t", ScopeName::new("s"))
    }

    #[test]
    fn finish_then_wait() {
        let (completer, handle) = pair();
        assert_eq!(handle.state(), ResultState::Pending);
        assert!(completer.finish(7));
        assert_eq!(handle.state(), ResultState::Finished);
        assert_eq!(handle.wait().unwrap(), Some(7));
        assert_eq!(handle.state(), ResultState::Consumed);
    }

    #[test]
    fn cancel_yields_none() {
        let (completer, handle) = pair();
        assert!(completer.cancel());
        assert_eq!(handle.wait().unwrap(), None);
    }

    #[test]
    fn dropped_completer_cancels() {
        let (completer, handle) = pair();
        drop(completer);
        assert_eq!(handle.state(), ResultState::Cancelled);
        assert_eq!(handle.wait().unwrap(), None);
    }

    #[test]
    fn failure_surfaces_message() {
        let (completer, handle) = pair();
        completer.fail("boom".into());
        let err = handle.wait().unwrap_err();
        assert_eq!(
            err,
            ScopeError::TaskFailed {
                task: "t".into(),
                message: "boom".into()
            }
        );
    }

    #[test]
    fn second_wait_is_rejected() {
        let (completer, handle) = pair();
        completer.finish(1);
        assert_eq!(handle.wait().unwrap(), Some(1));
        assert_eq!(
            handle.wait().unwrap_err(),
            ScopeError::AlreadyConsumed { task: "t".into() }
        );
    }

    #[test]
    fn first_settle_wins() {
        let (a, handle) = pair();
        let second = Completer {
            cell: Arc::downgrade(&handle.cell),
        };
        assert!(second.cancel());
        assert!(!a.finish(3));
        assert_eq!(handle.wait().unwrap(), None);
    }

    #[test]
    fn settle_after_handle_dropped_is_noop() {
        let (completer, handle) = pair();
        drop(handle);
        assert!(!completer.finish(9));
    }

    #[test]
    fn wait_timeout_leaves_handle_pending() {
        let (completer, handle) = pair();
        let err = handle.wait_timeout(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, ScopeError::WaitTimeout { task: "t".into() });
        assert_eq!(handle.state(), ResultState::Pending);

        completer.finish(5);
        assert_eq!(handle.wait().unwrap(), Some(5));
    }

    #[test]
    fn concurrent_waiters_get_value_once() {
        let (completer, handle) = pair();
        let outcomes = thread::scope(|s| {
            let waiters: Vec<_> = (0..2).map(|_| s.spawn(|| handle.wait())).collect();
            thread::sleep(Duration::from_millis(20));
            completer.finish(1);
            waiters
                .into_iter()
                .map(|w| w.join().unwrap())
                .collect::<Vec<_>>()
        });

        let values: Vec<_> = outcomes.iter().filter(|o| o.is_ok()).collect();
        assert_eq!(values.len(), 1);
        assert_eq!(*values[0], Ok(Some(1)));
        assert!(outcomes
            .iter()
            .any(|o| *o == Err(ScopeError::AlreadyConsumed { task: "t".into() })));
    }

    #[test]
    fn wait_wakes_on_other_thread_finish() {
        let (completer, handle) = pair();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.finish(11);
        });
        assert_eq!(handle.wait().unwrap(), Some(11));
        producer.join().unwrap();
    }
}

//! Thread-local identity of scope workers.
//!
//! Each worker thread records the scope it serves and the call stack of the
//! task it is executing. `call` uses this to find the current scope without
//! scanning the registry.

use crate::call_stack::CallStack;
use crate::scope::ScopeShared;
use ember_types::ScopeName;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Option<WorkerFrame>> = const { RefCell::new(None) };
}

/// What the current worker thread is doing.
#[derive(Clone)]
pub(crate) struct WorkerFrame {
    pub(crate) scope: Arc<ScopeShared>,
    pub(crate) call_stack: CallStack,
}

/// Clears the thread's worker identity on drop.
pub(crate) struct WorkerGuard {
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let frame = CURRENT.with(|current| current.borrow_mut().take());
        drop(frame);
    }
}

/// Marks the calling thread as the worker of `scope`.
pub(crate) fn enter(scope: Arc<ScopeShared>) -> WorkerGuard {
    CURRENT.with(|current| {
        *current.borrow_mut() = Some(WorkerFrame {
            scope,
            call_stack: CallStack::external(),
        });
    });
    WorkerGuard {
        _thread_bound: PhantomData,
    }
}

/// Records the call stack of the task about to run on this worker.
pub(crate) fn set_call_stack(call_stack: CallStack) {
    CURRENT.with(|current| {
        if let Some(frame) = current.borrow_mut().as_mut() {
            frame.call_stack = call_stack;
        }
    });
}

pub(crate) fn current_frame() -> Option<WorkerFrame> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Returns `true` if the calling thread is any scope's worker.
pub(crate) fn in_worker() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Returns `true` if the calling thread is the worker of `scope`.
pub(crate) fn is_worker_of(scope: &Arc<ScopeShared>) -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .is_some_and(|frame| Arc::ptr_eq(&frame.scope, scope))
    })
}

/// Name of the scope whose worker is the calling thread, if any.
///
/// # Example
///
/// ```
/// use ember_runtime::{current_scope, EngineConfig, Runner};
///
/// assert_eq!(current_scope(), None);
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let device = runner.scope("device");
/// let seen = device.call("whoami", current_scope).unwrap().wait().unwrap();
/// assert_eq!(seen.flatten().as_ref().map(|n| n.as_str()), Some("device"));
/// runner.release();
/// ```
#[must_use]
pub fn current_scope() -> Option<ScopeName> {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|frame| frame.scope.name().clone())
    })
}

/// Shows the current worker's scope as `WAITING` on `target` until dropped.
pub(crate) struct WaitingGuard {
    scope: Arc<ScopeShared>,
}

impl Drop for WaitingGuard {
    fn drop(&mut self) {
        self.scope.end_wait();
    }
}

/// Marks the calling worker's scope as waiting on `target`.
///
/// Returns `None` on non-worker threads and for waits on the worker's own
/// scope (those results are produced inline and never block).
pub(crate) fn mark_waiting(target: &ScopeName) -> Option<WaitingGuard> {
    let frame = current_frame()?;
    if frame.scope.name() == target {
        return None;
    }
    frame
        .scope
        .begin_wait(target)
        .then_some(WaitingGuard { scope: frame.scope })
}

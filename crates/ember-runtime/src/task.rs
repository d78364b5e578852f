//! Tasks: one-shot units of work bound to a scope.
//!
//! A [`Task`] pairs a named job with the call stack it was submitted under.
//! The job knows both how to run and how to be cancelled; whichever happens
//! first consumes it.

use crate::call_stack::CallStack;
use crate::pool::SlotLease;
use crate::result::{self, CallHandle, Completer};
use ember_types::ScopeName;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, trace};

/// How a task ended on its worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The callable returned normally.
    Completed,
    /// The callable panicked with the given message.
    Failed(String),
}

/// Type-erased body of a task.
trait Job: Send {
    fn invoke(self: Box<Self>, task: &str) -> TaskOutcome;
    fn cancel(self: Box<Self>);
}

/// Job with a waiter: the return value goes into a result cell.
struct CallJob<T, F> {
    func: F,
    completer: Completer<T>,
}

impl<T, F> Job for CallJob<T, F>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    fn invoke(self: Box<Self>, task: &str) -> TaskOutcome {
        let CallJob { func, completer } = *self;
        match panic::catch_unwind(AssertUnwindSafe(func)) {
            Ok(value) => {
                completer.finish(value);
                TaskOutcome::Completed
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %task, error = %message, "call task panicked");
                completer.fail(message.clone());
                TaskOutcome::Failed(message)
            }
        }
    }

    fn cancel(self: Box<Self>) {
        self.completer.cancel();
    }
}

/// Fire-and-forget job: nobody observes the outcome.
struct RunJob<F> {
    func: F,
}

impl<F> Job for RunJob<F>
where
    F: FnOnce() + Send + 'static,
{
    fn invoke(self: Box<Self>, task: &str) -> TaskOutcome {
        match panic::catch_unwind(AssertUnwindSafe(self.func)) {
            Ok(()) => TaskOutcome::Completed,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(task = %task, error = %message, "run task panicked");
                TaskOutcome::Failed(message)
            }
        }
    }

    fn cancel(self: Box<Self>) {}
}

/// A named unit of work submitted to a scope.
///
/// Owned by the target scope's queue until its worker executes it or the
/// scope cancels it. Either path consumes the task.
pub struct Task {
    name: String,
    call_stack: CallStack,
    job: Box<dyn Job>,
    lease: Option<SlotLease>,
}

impl Task {
    /// Binds `func` into a task whose result is delivered to the returned handle.
    ///
    /// `target` is the scope the task will run in; the handle reports it for
    /// diagnostics.
    pub fn make<T, F>(
        name: impl Into<String>,
        target: ScopeName,
        call_stack: CallStack,
        func: F,
    ) -> (Self, CallHandle<T>)
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let name = name.into();
        let (completer, handle) = result::channel(&name, target);
        let task = Self {
            name,
            call_stack,
            job: Box::new(CallJob { func, completer }),
            lease: None,
        };
        (task, handle)
    }

    /// Binds `func` into a task nobody waits on.
    pub fn detached<F>(name: impl Into<String>, func: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            name: name.into(),
            call_stack: CallStack::external(),
            job: Box::new(RunJob { func }),
            lease: None,
        }
    }

    /// Attaches the storage lease released when the task is discarded.
    #[must_use]
    pub fn with_lease(mut self, lease: SlotLease) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call stack the task was submitted under.
    #[must_use]
    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// Runs the task on the calling thread.
    ///
    /// Panics inside the callable are caught and reported to the result handle.
    pub fn invoke(self) -> TaskOutcome {
        let Self {
            name, job, lease, ..
        } = self;
        trace!(task = %name, "invoking task");
        let outcome = job.invoke(&name);
        drop(lease);
        outcome
    }

    /// Discards the task without running it; its waiter sees a cancellation.
    pub fn cancel(self) {
        trace!(task = %self.name, "cancelling task");
        self.job.cancel();
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("call_stack", &self.call_stack)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

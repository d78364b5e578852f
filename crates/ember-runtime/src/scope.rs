//! Scope - a named, single-threaded execution context.
//!
//! A [`Scope`] owns a FIFO [`TaskQueue`] and, while active, one worker
//! thread that drains it. Everything submitted to a scope runs sequentially
//! on that worker.
//!
//! # Submission
//!
//! ```text
//!   run(name, f)                       call(name, f)
//!        │                                  │
//!        │                   current scope == target? ──yes──► invoke inline
//!        │                                  │ no
//!        │                   CallStack::enter (cycle + depth)
//!        │                                  │
//!        └──────────────┬───────────────────┘
//!                       ▼
//!                  enqueue(task)
//!                       │
//!        ┌──────────────┼──────────────────────┐
//!        ▼              ▼                      ▼
//!   IDLE: spawn     EMPTY: → READY       STOPPING/closed:
//!   worker, EMPTY   notify worker        cancel task, Err
//! ```
//!
//! # Worker lifecycle
//!
//! The worker waits on the queue with the remaining idle budget. When the
//! budget runs out with nothing queued it takes the scope through
//! `STOPPING` to `IDLE` and exits. The decision is taken under the scope
//! lock, so a concurrent submission either lands first (and the worker keeps
//! running) or sees `IDLE` and starts a fresh worker.
//!
//! Each worker carries a generation number. A worker whose generation no
//! longer matches the scope's exits without touching the queue.

use crate::call_stack::CallStack;
use crate::config::EngineConfig;
use crate::error::ScopeError;
use crate::pool::{SlotAllocator, SlotLease};
use crate::queue::TaskQueue;
use crate::result::CallHandle;
use crate::snapshot::{ScopeSnapshot, ScopeStats};
use crate::state::ScopeState;
use crate::task::{Task, TaskOutcome};
use crate::worker;
use ember_types::ScopeName;
use parking_lot::{Condvar, Mutex};
use std::mem;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Engine-wide settings shared by every scope of a registry.
#[derive(Debug)]
pub(crate) struct EngineContext {
    pub(crate) config: EngineConfig,
    pub(crate) pool: Arc<dyn SlotAllocator>,
}

impl EngineContext {
    pub(crate) fn new(config: EngineConfig, pool: Arc<dyn SlotAllocator>) -> Self {
        Self { config, pool }
    }
}

#[derive(Debug)]
struct RunningTask {
    name: String,
    call_stack: CallStack,
}

#[derive(Debug)]
struct WaitInfo {
    target: ScopeName,
    since: Instant,
}

#[derive(Debug)]
struct ScopeInner {
    state: ScopeState,
    queue: TaskQueue,
    current: Option<RunningTask>,
    waiting: Option<WaitInfo>,
    worker: Option<JoinHandle<()>>,
    generation: u64,
    /// Explicit stop (or close) in progress; the worker finishes it.
    stop_requested: bool,
    closed: bool,
    last_active: Instant,
    stats: ScopeStats,
}

/// State shared between a [`Scope`] handle and its worker thread.
#[derive(Debug)]
pub(crate) struct ScopeShared {
    name: ScopeName,
    ctx: Arc<EngineContext>,
    inner: Mutex<ScopeInner>,
    work_ready: Condvar,
}

impl ScopeShared {
    pub(crate) fn name(&self) -> &ScopeName {
        &self.name
    }

    /// Moves to `next`, logging transitions the state machine does not list.
    fn transition(&self, inner: &mut ScopeInner, next: ScopeState) {
        let prev = inner.state;
        if prev == next {
            return;
        }
        if !prev.can_transition_to(next) {
            warn!(scope = %self.name, from = %prev, to = %next, "unexpected state transition");
        }
        debug!(scope = %self.name, from = %prev, to = %next, "state transition");
        inner.state = next;
    }

    /// Puts `task` at the tail of the queue, starting a worker if needed.
    ///
    /// On every error path the task is cancelled, so its waiter is released.
    fn enqueue(self: &Arc<Self>, task: Task) -> Result<(), ScopeError> {
        let mut inner = self.inner.lock();

        let rejection = if inner.closed {
            Some(ScopeError::Closed {
                scope: self.name.clone(),
            })
        } else if inner.state == ScopeState::Stopping {
            Some(ScopeError::Stopping {
                scope: self.name.clone(),
            })
        } else if inner.state == ScopeState::Idle {
            self.start_worker(&mut inner).err()
        } else {
            None
        };
        if let Some(err) = rejection {
            drop(inner);
            warn!(scope = %self.name, task = %task.name(), error = %err, "task rejected");
            task.cancel();
            return Err(err);
        }

        let capacity = inner.queue.capacity().unwrap_or_default();
        if let Err(task) = inner.queue.try_push(task, &self.name) {
            drop(inner);
            task.cancel();
            return Err(ScopeError::QueueFull {
                scope: self.name.clone(),
                capacity,
            });
        }

        if inner.state == ScopeState::Empty {
            self.transition(&mut inner, ScopeState::Ready);
        }
        drop(inner);
        self.work_ready.notify_all();
        Ok(())
    }

    fn start_worker(self: &Arc<Self>, inner: &mut ScopeInner) -> Result<(), ScopeError> {
        let generation = inner.generation + 1;
        let shared = Arc::clone(self);

        let mut builder = thread::Builder::new().name(format!("scope:{}", self.name));
        if self.ctx.config.worker_stack_size > 0 {
            builder = builder.stack_size(self.ctx.config.worker_stack_size);
        }

        match builder.spawn(move || shared.worker_loop(generation)) {
            Ok(handle) => {
                inner.generation = generation;
                inner.worker = Some(handle);
                inner.last_active = Instant::now();
                inner.stats.starts += 1;
                self.transition(inner, ScopeState::Empty);
                info!(scope = %self.name, generation, "worker started");
                Ok(())
            }
            Err(e) => {
                error!(scope = %self.name, error = %e, "failed to spawn worker thread");
                Err(ScopeError::WorkerSpawn {
                    scope: self.name.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn worker_loop(self: Arc<Self>, generation: u64) {
        let _guard = worker::enter(Arc::clone(&self));
        while let Some(task) = self.next_task(generation) {
            self.execute(task);
        }
        debug!(scope = %self.name, generation, "worker exited");
    }

    /// Blocks until there is a task to run, or returns `None` when the
    /// worker should exit.
    fn next_task(&self, generation: u64) -> Option<Task> {
        let mut inner = self.inner.lock();
        loop {
            if inner.generation != generation || inner.state == ScopeState::Idle {
                return None;
            }

            if inner.stop_requested {
                let leftovers = self.finish_stop(&mut inner);
                drop(inner);
                cancel_all(&self.name, leftovers);
                return None;
            }

            if let Some(task) = inner.queue.pop_front() {
                self.transition(&mut inner, ScopeState::Running);
                inner.current = Some(RunningTask {
                    name: task.name().to_string(),
                    call_stack: task.call_stack().clone(),
                });
                return Some(task);
            }

            match self.ctx.config.idle_timeout() {
                Some(limit) => {
                    let idle_for = inner.last_active.elapsed();
                    if idle_for >= limit {
                        self.idle_stop(&mut inner);
                        return None;
                    }
                    self.work_ready.wait_for(&mut inner, limit - idle_for);
                }
                None => self.work_ready.wait(&mut inner),
            }
        }
    }

    fn execute(&self, task: Task) {
        worker::set_call_stack(task.call_stack().clone());
        let outcome = task.invoke();
        worker::set_call_stack(CallStack::external());

        let mut inner = self.inner.lock();
        inner.current = None;
        inner.last_active = Instant::now();
        match outcome {
            TaskOutcome::Completed => inner.stats.executed += 1,
            TaskOutcome::Failed(_) => inner.stats.failed += 1,
        }
        if inner.state.is_busy() {
            let next = if inner.queue.is_empty() {
                ScopeState::Empty
            } else {
                ScopeState::Ready
            };
            self.transition(&mut inner, next);
        }
    }

    /// EMPTY → STOPPING → IDLE for an idle worker. The queue is empty.
    fn idle_stop(&self, inner: &mut ScopeInner) {
        self.transition(inner, ScopeState::Stopping);
        self.transition(inner, ScopeState::Idle);
        // The worker is exiting on its own.
        drop(inner.worker.take());
        inner.stats.idle_stops += 1;
        debug!(
            scope = %self.name,
            idle_ms = inner.last_active.elapsed().as_millis() as u64,
            "idle scope stopped"
        );
    }

    /// Completes an explicit stop on the worker side.
    fn finish_stop(&self, inner: &mut ScopeInner) -> Vec<Task> {
        self.transition(inner, ScopeState::Stopping);
        let leftovers = inner.queue.drain();
        inner.stats.cancelled += leftovers.len() as u64;
        inner.current = None;
        inner.waiting = None;
        inner.stop_requested = false;
        drop(inner.worker.take());
        self.transition(inner, ScopeState::Idle);
        info!(scope = %self.name, "scope stopped");
        leftovers
    }

    /// Moves an idle scope to IDLE on behalf of the supervisor.
    fn stop_if_idle(&self, limit: Duration) -> bool {
        let mut inner = self.inner.lock();
        let idle = inner.state == ScopeState::Empty
            && inner.queue.is_empty()
            && !inner.stop_requested
            && inner.last_active.elapsed() >= limit;
        if idle {
            self.idle_stop(&mut inner);
        }
        drop(inner);
        if idle {
            // Lets the retired worker observe IDLE and exit.
            self.work_ready.notify_all();
        }
        idle
    }

    /// Phase one of a stop: cancel queued work and hand back the worker to join.
    fn request_stop(&self, close: bool) -> (usize, Option<JoinHandle<()>>) {
        let mut inner = self.inner.lock();
        if close {
            inner.closed = true;
        }
        if inner.state == ScopeState::Idle {
            return (0, None);
        }

        inner.stop_requested = true;
        self.transition(&mut inner, ScopeState::Stopping);
        let drained = inner.queue.drain();
        inner.stats.cancelled += drained.len() as u64;
        // A worker never joins another worker: it might be the one waiting on it.
        let handle = if worker::in_worker() {
            None
        } else {
            inner.worker.take()
        };
        drop(inner);
        self.work_ready.notify_all();

        let cancelled = drained.len();
        if cancelled > 0 {
            warn!(scope = %self.name, cancelled, "cancelled queued tasks on stop");
        }
        cancel_all(&self.name, drained);
        (cancelled, handle)
    }

    /// RUNNING → WAITING for the duration of a cross-scope wait.
    pub(crate) fn begin_wait(&self, target: &ScopeName) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != ScopeState::Running {
            return false;
        }
        self.transition(&mut inner, ScopeState::Waiting);
        inner.waiting = Some(WaitInfo {
            target: target.clone(),
            since: Instant::now(),
        });
        true
    }

    pub(crate) fn end_wait(&self) {
        let mut inner = self.inner.lock();
        inner.waiting = None;
        if inner.state == ScopeState::Waiting {
            self.transition(&mut inner, ScopeState::Running);
        }
    }
}

fn cancel_all(scope: &ScopeName, tasks: Vec<Task>) {
    for task in tasks {
        trace!(scope = %scope, task = %task.name(), "cancelling queued task");
        task.cancel();
    }
}

fn join_worker(scope: &ScopeName, handle: JoinHandle<()>) {
    if handle.join().is_err() {
        error!(scope = %scope, "worker thread panicked");
    }
}

/// Handle to a named scope.
///
/// Handles are cheap to clone; every clone refers to the same scope. Obtain
/// them from [`Registry::scope`](crate::Registry::scope) or
/// [`Runner::scope`](crate::Runner::scope).
///
/// # Example
///
/// ```
/// use ember_runtime::{EngineConfig, Runner};
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let device = runner.scope("device");
///
/// let answer = device.call("answer", || 6 * 7).unwrap();
/// assert_eq!(answer.wait().unwrap(), Some(42));
/// runner.release();
/// ```
#[derive(Clone)]
pub struct Scope {
    shared: Arc<ScopeShared>,
}

impl Scope {
    pub(crate) fn new(name: ScopeName, ctx: Arc<EngineContext>, closed: bool) -> Self {
        let queue = TaskQueue::with_capacity(ctx.config.queue_capacity);
        let inner = ScopeInner {
            state: ScopeState::Idle,
            queue,
            current: None,
            waiting: None,
            worker: None,
            generation: 0,
            stop_requested: false,
            closed,
            last_active: Instant::now(),
            stats: ScopeStats::default(),
        };
        Self {
            shared: Arc::new(ScopeShared {
                name,
                ctx,
                inner: Mutex::new(inner),
                work_ready: Condvar::new(),
            }),
        }
    }

    /// Scope name.
    #[must_use]
    pub fn name(&self) -> &ScopeName {
        &self.shared.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ScopeState {
        self.shared.inner.lock().state
    }

    /// Number of tasks waiting in the queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Returns `true` if the calling thread is this scope's worker.
    #[must_use]
    pub fn is_current(&self) -> bool {
        worker::is_worker_of(&self.shared)
    }

    /// Returns `true` if both handles refer to the same scope.
    #[must_use]
    pub fn same_scope(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Submits `func` for execution on this scope without waiting for it.
    ///
    /// Never blocks past the time needed to enqueue.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::PoolExhausted`] if task storage cannot be allocated
    /// - [`ScopeError::WorkerSpawn`] if an idle scope cannot start its worker
    /// - [`ScopeError::QueueFull`] if the queue is bounded and full
    /// - [`ScopeError::Stopping`] / [`ScopeError::Closed`] while shutting down
    pub fn run<F>(&self, task_name: impl Into<String>, func: F) -> Result<(), ScopeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let lease = self.lease(mem::size_of::<F>())?;
        let task = Task::detached(task_name, func).with_lease(lease);
        self.shared.enqueue(task)
    }

    /// Submits `func` and returns a handle to its result.
    ///
    /// Called from this scope's own worker, `func` runs inline before `call`
    /// returns. Otherwise the task is queued and the caller collects the
    /// result with [`CallHandle::wait`]; a worker blocked there shows up as
    /// `WAITING` on this scope.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::DeadlockAvoided`] if this scope is already on the
    ///   caller's synchronous call chain
    /// - [`ScopeError::CallDepthExceeded`] if the chain would grow too long
    /// - every submission error of [`run`](Self::run)
    pub fn call<T, F>(
        &self,
        task_name: impl Into<String>,
        func: F,
    ) -> Result<CallHandle<T>, ScopeError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let task_name = task_name.into();
        let frame = worker::current_frame();

        let call_stack = match frame {
            Some(ref frame) if Arc::ptr_eq(&frame.scope, &self.shared) => {
                trace!(scope = %self.name(), task = %task_name, "inline same-scope call");
                let (task, handle) =
                    Task::make(task_name, self.name().clone(), frame.call_stack.clone(), func);
                task.invoke();
                self.shared.inner.lock().stats.inline_calls += 1;
                return Ok(handle);
            }
            Some(ref frame) => frame
                .call_stack
                .enter(
                    frame.scope.name(),
                    self.name(),
                    self.shared.ctx.config.max_call_depth,
                )
                .map_err(|err| {
                    warn!(
                        scope = %self.name(),
                        caller = %frame.scope.name(),
                        task = %task_name,
                        error = %err,
                        "call rejected"
                    );
                    err
                })?,
            None => CallStack::external(),
        };

        let lease = self.lease(mem::size_of::<F>() + mem::size_of::<T>())?;
        let (task, handle) = Task::make(task_name, self.name().clone(), call_stack, func);
        self.shared.enqueue(task.with_lease(lease))?;
        Ok(handle)
    }

    /// Stops the worker, cancelling everything still queued.
    ///
    /// Waits for the running task to finish unless called from a scope
    /// worker. The scope becomes `IDLE` and restarts on the next submission.
    /// Returns the number of cancelled tasks.
    pub fn stop(&self) -> usize {
        let (cancelled, handle) = self.shared.request_stop(false);
        if let Some(handle) = handle {
            join_worker(self.name(), handle);
        }
        info!(scope = %self.name(), cancelled, "stop requested");
        cancelled
    }

    /// Point-in-time diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> ScopeSnapshot {
        let inner = self.shared.inner.lock();
        ScopeSnapshot {
            name: self.name().clone(),
            state: inner.state,
            queued: inner.queue.len(),
            current_task: inner.current.as_ref().map(|t| t.name.clone()),
            call_stack: inner.current.as_ref().map(|t| t.call_stack.clone()),
            waiting_on: inner.waiting.as_ref().map(|w| w.target.clone()),
            waiting_ms: inner
                .waiting
                .as_ref()
                .map(|w| w.since.elapsed().as_millis() as u64),
            closed: inner.closed,
            stats: inner.stats,
        }
    }

    /// Scope this one is blocked on and for how long.
    pub(crate) fn waiting_for(&self) -> Option<(ScopeName, Duration)> {
        let inner = self.shared.inner.lock();
        inner
            .waiting
            .as_ref()
            .map(|w| (w.target.clone(), w.since.elapsed()))
    }

    pub(crate) fn stop_if_idle(&self, limit: Duration) -> bool {
        self.shared.stop_if_idle(limit)
    }

    /// Closes the scope for good. Returns the cancelled count and the worker
    /// to join once every scope has been closed.
    pub(crate) fn close(&self) -> (usize, Option<JoinHandle<()>>) {
        self.shared.request_stop(true)
    }

    pub(crate) fn join(&self, handle: JoinHandle<()>) {
        join_worker(self.name(), handle);
    }

    fn lease(&self, payload: usize) -> Result<SlotLease, ScopeError> {
        SlotLease::acquire(
            &self.shared.ctx.pool,
            self.name().as_str(),
            payload + mem::size_of::<Task>(),
        )
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("name", self.name())
            .field("state", &self.state())
            .finish()
    }
}

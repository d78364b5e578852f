//! FIFO task queue owned by a scope.

use crate::task::Task;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Strict FIFO queue of tasks with an optional capacity.
///
/// Not synchronized: it lives inside the scope's lock.
#[derive(Debug, Default)]
pub struct TaskQueue {
    queue: VecDeque<Task>,
    capacity: Option<usize>,
}

impl TaskQueue {
    /// Creates an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue holding at most `capacity` tasks (`0` = unbounded).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: (capacity > 0).then_some(capacity),
        }
    }

    /// Configured capacity, if bounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Appends a task at the tail.
    ///
    /// Returns the task back if the queue is full.
    pub fn try_push(&mut self, task: Task, scope: impl std::fmt::Display) -> Result<(), Task> {
        if let Some(capacity) = self.capacity {
            if self.queue.len() >= capacity {
                warn!(
                    scope = %scope,
                    task = %task.name(),
                    capacity,
                    "task queue full, rejecting task"
                );
                return Err(task);
            }
        }

        debug!(
            scope = %scope,
            task = %task.name(),
            queued = self.queue.len() + 1,
            "task enqueued"
        );
        self.queue.push_back(task);
        Ok(())
    }

    /// Removes the task at the head.
    pub fn pop_front(&mut self) -> Option<Task> {
        self.queue.pop_front()
    }

    /// Takes every queued task in submission order.
    pub fn drain(&mut self) -> Vec<Task> {
        self.queue.drain(..).collect()
    }
}

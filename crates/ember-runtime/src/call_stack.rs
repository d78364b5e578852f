//! Call-stack frames carried by synchronous calls.
//!
//! A task submitted through [`Scope::call`](crate::Scope::call) remembers the
//! chain of scopes that are (transitively) blocked on it:
//!
//! ```text
//!   main ──call──▶ device ──call──▶ storage
//!
//!   task on device  : [main]
//!   task on storage : [main, device]
//! ```
//!
//! Entering a scope that already appears in the chain would close a wait
//! cycle, so [`CallStack::enter`] rejects it before anything is enqueued.

use crate::error::ScopeError;
use ember_types::ScopeName;
use serde::Serialize;

/// Ordered chain of scopes already entered by a synchronous call path.
///
/// Outermost scope first. Tasks from [`Scope::run`](crate::Scope::run) and
/// calls issued from threads outside any scope carry an empty stack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CallStack {
    frames: Vec<ScopeName>,
}

impl CallStack {
    /// Stack for a call issued from a thread that is not a scope worker.
    #[must_use]
    pub fn external() -> Self {
        Self::default()
    }

    /// Returns `true` for an external (empty) stack.
    #[must_use]
    pub fn is_external(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of scopes on the chain.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if `scope` is already on the chain.
    #[must_use]
    pub fn contains(&self, scope: &ScopeName) -> bool {
        self.frames.iter().any(|frame| frame == scope)
    }

    /// Scopes on the chain, outermost first.
    #[must_use]
    pub fn frames(&self) -> &[ScopeName] {
        &self.frames
    }

    /// Builds the stack for a call from `caller` (running with `self`) into `target`.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::DeadlockAvoided`] if `target` is already on the chain
    /// - [`ScopeError::CallDepthExceeded`] if the new chain exceeds `max_depth`
    pub fn enter(
        &self,
        caller: &ScopeName,
        target: &ScopeName,
        max_depth: usize,
    ) -> Result<Self, ScopeError> {
        if self.contains(target) || caller == target {
            let mut chain = self.frames.clone();
            chain.push(caller.clone());
            return Err(ScopeError::DeadlockAvoided {
                target: target.clone(),
                chain,
            });
        }

        let depth = self.frames.len() + 1;
        if depth > max_depth {
            return Err(ScopeError::CallDepthExceeded {
                target: target.clone(),
                depth,
                max: max_depth,
            });
        }

        let mut frames = Vec::with_capacity(depth);
        frames.extend(self.frames.iter().cloned());
        frames.push(caller.clone());
        Ok(Self { frames })
    }
}

//! Runner - engine lifecycle.
//!
//! A [`Runner`] is constructed once at process start and released once at
//! shutdown. It owns the [`Registry`], the slot allocator and the manager
//! thread, and hands out scopes to the rest of the program.
//!
//! # Lifecycle
//!
//! ```text
//! Runner::initialize(config)
//!     │  build allocator, registry
//!     │  spawn manager thread
//!     ▼
//! runner.scope("main").run(..) / .call(..)
//!     │
//!     ▼
//! runner.release()
//!     1. stop the manager
//!     2. close every scope, cancelling queued tasks
//!     3. join worker threads
//! ```

use crate::config::EngineConfig;
use crate::error::ScopeError;
use crate::manager::{self, ManagerHandle, ScopeManager};
use crate::pool::{PoolUsage, SlotAllocator, TaggedPool};
use crate::registry::Registry;
use crate::scope::{EngineContext, Scope};
use crate::snapshot::{ReleaseReport, ScopeSnapshot, SweepReport};
use ember_types::ScopeName;
use std::sync::Arc;
use tracing::info;

/// Owner of a scope engine instance.
///
/// Dropping a runner releases it.
///
/// # Example
///
/// ```
/// use ember_runtime::{EngineConfig, Runner};
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let main = runner.scope("main");
/// main.run("hello", || println!("hello from main")).unwrap();
///
/// let report = runner.release();
/// assert_eq!(report.scopes, 1);
/// ```
pub struct Runner {
    registry: Registry,
    manager: Option<ManagerHandle>,
    tagged: Option<Arc<TaggedPool>>,
    released: bool,
}

impl Runner {
    /// Starts an engine with the default [`TaggedPool`] allocator.
    ///
    /// The pool is bounded by `config.pool_capacity_bytes` when non-zero.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::InvalidConfig`] if `config` fails validation
    /// - [`ScopeError::WorkerSpawn`] if the manager thread cannot be started
    pub fn initialize(config: EngineConfig) -> Result<Self, ScopeError> {
        let pool = Arc::new(match config.pool_capacity() {
            Some(capacity) => TaggedPool::bounded(capacity),
            None => TaggedPool::unbounded(),
        });
        let allocator: Arc<dyn SlotAllocator> = pool.clone();
        let mut runner = Self::start(config, allocator)?;
        runner.tagged = Some(pool);
        Ok(runner)
    }

    /// Starts an engine that takes task storage from `allocator`.
    ///
    /// # Errors
    ///
    /// - [`ScopeError::InvalidConfig`] if `config` fails validation
    /// - [`ScopeError::WorkerSpawn`] if the manager thread cannot be started
    pub fn with_allocator(
        config: EngineConfig,
        allocator: Arc<dyn SlotAllocator>,
    ) -> Result<Self, ScopeError> {
        Self::start(config, allocator)
    }

    fn start(config: EngineConfig, allocator: Arc<dyn SlotAllocator>) -> Result<Self, ScopeError> {
        config
            .validate()
            .map_err(|e| ScopeError::InvalidConfig {
                reason: e.to_string(),
            })?;
        info!(
            idle_timeout_ms = config.idle_timeout_ms,
            max_call_depth = config.max_call_depth,
            "initializing scope engine"
        );
        let registry = Registry::new(Arc::new(EngineContext::new(config, allocator)));
        let manager = ScopeManager::spawn(registry.clone())?;
        Ok(Self {
            registry,
            manager: Some(manager),
            tagged: None,
            released: false,
        })
    }

    /// The scope registry.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Shorthand for `registry().scope(name)`.
    pub fn scope(&self, name: impl Into<ScopeName>) -> Scope {
        self.registry.scope(name)
    }

    /// Snapshots of every scope.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScopeSnapshot> {
        self.registry.snapshot()
    }

    /// Runs a supervision sweep immediately.
    pub fn sweep_now(&self) -> SweepReport {
        self.manager
            .as_ref()
            .and_then(ManagerHandle::sweep)
            .unwrap_or_else(|| manager::sweep(&self.registry))
    }

    /// Usage of the default pool; `None` with a custom allocator.
    #[must_use]
    pub fn pool_usage(&self) -> Option<PoolUsage> {
        self.tagged.as_ref().map(|pool| pool.usage())
    }

    /// Stops the manager, closes every scope and joins the workers.
    ///
    /// Every queued task is cancelled, so no waiter stays blocked.
    pub fn release(mut self) -> ReleaseReport {
        self.shutdown()
    }

    fn shutdown(&mut self) -> ReleaseReport {
        if self.released {
            return ReleaseReport::default();
        }
        self.released = true;

        if let Some(manager) = self.manager.take() {
            manager.shutdown();
        }
        let report = self.registry.close();
        info!(
            scopes = report.scopes,
            cancelled = report.cancelled,
            "scope engine released"
        );
        report
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("registry", &self.registry)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

//! Registry - name to scope mapping.
//!
//! Scopes are singletons per registry: every lookup of a name returns a
//! handle to the same scope, however many threads race to create it.

use crate::config::EngineConfig;
use crate::scope::{EngineContext, Scope};
use crate::snapshot::{ReleaseReport, ScopeSnapshot, WaitEdge};
use ember_types::ScopeName;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct RegistryShared {
    ctx: Arc<EngineContext>,
    scopes: RwLock<HashMap<ScopeName, Scope>>,
    closed: AtomicBool,
}

/// Shared table of named scopes.
///
/// Cloning a `Registry` yields another handle to the same table, so it can be
/// handed to every subsystem that needs to address scopes by name.
///
/// # Example
///
/// ```
/// use ember_runtime::{EngineConfig, Runner};
///
/// let runner = Runner::initialize(EngineConfig::default()).unwrap();
/// let registry = runner.registry().clone();
///
/// let a = registry.scope("device");
/// let b = registry.scope("device");
/// assert!(a.same_scope(&b));
/// assert_eq!(registry.len(), 1);
/// runner.release();
/// ```
#[derive(Clone)]
pub struct Registry {
    shared: Arc<RegistryShared>,
}

impl Registry {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self {
            shared: Arc::new(RegistryShared {
                ctx,
                scopes: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the scope named `name`, creating it on first use.
    ///
    /// Scopes created after the registry was released are born closed.
    pub fn scope(&self, name: impl Into<ScopeName>) -> Scope {
        let name = name.into();
        if let Some(scope) = self.shared.scopes.read().get(&name) {
            return scope.clone();
        }

        let mut scopes = self.shared.scopes.write();
        scopes
            .entry(name)
            .or_insert_with_key(|name| {
                debug!(scope = %name, "scope created");
                Scope::new(
                    name.clone(),
                    Arc::clone(&self.shared.ctx),
                    self.shared.closed.load(Ordering::Acquire),
                )
            })
            .clone()
    }

    /// Returns the scope named `name` if it has been created.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Scope> {
        self.shared.scopes.read().get(name).cloned()
    }

    /// All scopes, ordered by name.
    #[must_use]
    pub fn scopes(&self) -> Vec<Scope> {
        let mut scopes: Vec<Scope> = self.shared.scopes.read().values().cloned().collect();
        scopes.sort_by(|a, b| a.name().cmp(b.name()));
        scopes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.scopes.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.scopes.read().is_empty()
    }

    /// Snapshots of all scopes, ordered by name.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ScopeSnapshot> {
        self.scopes().iter().map(Scope::snapshot).collect()
    }

    /// Live `caller -> target` edges of scopes blocked in a call.
    #[must_use]
    pub fn wait_graph(&self) -> Vec<WaitEdge> {
        self.scopes()
            .iter()
            .filter_map(|scope| {
                scope.waiting_for().map(|(to, waited)| WaitEdge {
                    from: scope.name().clone(),
                    to,
                    waited_ms: waited.as_millis() as u64,
                })
            })
            .collect()
    }

    /// Engine settings shared by every scope.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.shared.ctx.config
    }

    /// Returns `true` once the registry has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Closes every scope, then joins their workers.
    ///
    /// All scopes are closed (and their queues cancelled) before any worker is
    /// joined, so a worker blocked on another scope's result is released
    /// before anyone waits for it.
    pub(crate) fn close(&self) -> ReleaseReport {
        // Hold the write lock while flipping the flag so no scope is created
        // open after this point.
        let scopes = {
            let map = self.shared.scopes.write();
            self.shared.closed.store(true, Ordering::Release);
            let mut scopes: Vec<Scope> = map.values().cloned().collect();
            scopes.sort_by(|a, b| a.name().cmp(b.name()));
            scopes
        };

        let mut report = ReleaseReport {
            scopes: scopes.len(),
            cancelled: 0,
        };
        let mut workers = Vec::new();
        for scope in &scopes {
            let (cancelled, handle) = scope.close();
            report.cancelled += cancelled;
            if let Some(handle) = handle {
                workers.push((scope, handle));
            }
        }

        for (scope, handle) in workers {
            scope.join(handle);
        }

        info!(
            scopes = report.scopes,
            cancelled = report.cancelled,
            "registry closed"
        );
        report
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("scopes", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::TaggedPool;
    use crate::state::ScopeState;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn registry() -> Registry {
        Registry::new(Arc::new(EngineContext::new(
            EngineConfig::default(),
            Arc::new(TaggedPool::unbounded()),
        )))
    }

    #[test]
    fn same_name_same_scope() {
        let reg = registry();
        let a = reg.scope("x");
        let b = reg.scope(ScopeName::new("x"));
        assert!(a.same_scope(&b));
        assert!(!a.same_scope(&reg.scope("y")));
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn concurrent_creation_yields_one_scope() {
        let reg = registry();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    reg.scope("shared")
                })
            })
            .collect();

        let scopes: Vec<Scope> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(scopes.iter().all(|s| s.same_scope(&scopes[0])));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let reg = registry();
        assert!(reg.get("ghost").is_none());
        assert!(reg.is_empty());
        reg.scope("ghost");
        assert!(reg.get("ghost").is_some());
    }

    #[test]
    fn scopes_are_sorted() {
        let reg = registry();
        for name in ["c", "a", "b"] {
            reg.scope(name);
        }
        let names: Vec<String> = reg.scopes().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert_eq!(reg.snapshot().len(), 3);
    }

    #[test]
    fn close_cancels_and_marks_new_scopes_closed() {
        let reg = registry();
        let s = reg.scope("busy");
        s.call("warm", || ())
            .unwrap()
            .wait_timeout(Duration::from_secs(5))
            .unwrap();

        let report = reg.close();
        assert_eq!(report.scopes, 1);
        assert!(reg.is_closed());
        assert_eq!(s.state(), ScopeState::Idle);

        let late = reg.scope("late");
        assert!(late.snapshot().closed);
        assert!(late.run("nope", || {}).is_err());
    }

    #[test]
    fn wait_graph_is_empty_without_calls() {
        let reg = registry();
        reg.scope("a");
        assert!(reg.wait_graph().is_empty());
    }
}

//! Ember Runtime - named-scope task engine.
//!
//! Work is organised into named [`Scope`]s. Each scope runs its tasks one at
//! a time, in submission order, on a worker thread it starts on demand and
//! stops when idle. Code anywhere in the process addresses a scope by name
//! and either fires a task at it ([`Scope::run`]) or calls into it and
//! collects the result ([`Scope::call`] + [`CallHandle::wait`]).
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ember-types    : ScopeName, ErrorCode                       │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  runner/    : Runner (initialize/release), manager thread    │
//! │  registry/  : name → Scope singletons                        │
//! │  scope/     : queue, worker loop, run/call, state machine    │
//! │  task/      : Task, CallHandle, CallStack                    │
//! │  pool/      : SlotAllocator boundary, TaggedPool             │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ember-cli      : `ember` binary                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Calls and deadlock avoidance
//!
//! Every task carries the chain of scopes synchronously waiting on it. A
//! call whose target is already on that chain would wait on itself, so it
//! is refused with [`ScopeError::DeadlockAvoided`] before anything is
//! queued. A call into the caller's own scope runs inline instead.
//!
//! ```
//! use ember_runtime::{EngineConfig, Runner, ScopeError};
//!
//! let runner = Runner::initialize(EngineConfig::default()).unwrap();
//! let main = runner.scope("main");
//! let device = runner.scope("device");
//!
//! let back_to_main = main.clone();
//! let d1 = device
//!     .call("d1", move || back_to_main.call("d2", || ()).map(|_| ()))
//!     .unwrap();
//!
//! // Called from outside any scope, so "main" is not on d1's chain yet.
//! assert!(d1.wait().unwrap().unwrap().is_ok());
//!
//! let device_again = device.clone();
//! let main_back = main.clone();
//! let outer = main
//!     .call("m1", move || {
//!         device_again
//!             .call("d1", move || main_back.call("d2", || ()).err())
//!             .and_then(|h| h.wait())
//!     })
//!     .unwrap();
//! let rejected = outer.wait().unwrap().unwrap().unwrap().flatten();
//! assert!(matches!(rejected, Some(ScopeError::DeadlockAvoided { .. })));
//! runner.release();
//! ```
//!
//! # Configuration
//!
//! [`EngineConfig`] tunes idle timeouts, call depth, queue bounds and the
//! allocator budget. [`config::ConfigLoader`] layers it from TOML files and
//! `EMBER_*` environment variables.

pub mod call_stack;
pub mod config;
pub mod error;
mod manager;
pub mod pool;
pub mod queue;
pub mod registry;
pub mod result;
pub mod runner;
pub mod scope;
pub mod snapshot;
pub mod state;
pub mod task;
mod worker;

// Re-exports for convenience
pub use call_stack::CallStack;
pub use config::{ConfigError, ConfigLoader, EmberConfig, EngineConfig, LoggingConfig};
pub use error::ScopeError;
pub use pool::{PoolUsage, SlotAllocator, SlotId, SlotLease, TaggedPool};
pub use queue::TaskQueue;
pub use registry::Registry;
pub use result::{CallHandle, ResultState};
pub use runner::Runner;
pub use scope::Scope;
pub use snapshot::{ReleaseReport, ScopeSnapshot, ScopeStats, SweepReport, WaitEdge};
pub use state::ScopeState;
pub use task::{Task, TaskOutcome};
pub use worker::current_scope;

pub use ember_types::{ErrorCode, ScopeName};

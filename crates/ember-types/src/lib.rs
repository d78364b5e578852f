//! Core types for the ember scope engine.
//!
//! This crate holds the small set of types every other ember crate agrees on:
//!
//! - [`ScopeName`]: the identity of a named scope (registry key, call-stack frame)
//! - [`ErrorCode`]: machine-readable error codes with recoverability info
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ember-types    : ScopeName, ErrorCode          ◄── HERE     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ember-runtime  : Scope, Registry, Runner, CallHandle        │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ember-cli      : `ember` binary (demo, stress, config)      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use ember_types::ScopeName;
//!
//! let main = ScopeName::new("main");
//! let again: ScopeName = "main".into();
//! assert_eq!(main, again);
//! assert_eq!(main.as_str(), "main");
//! ```

mod error;
mod name;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use name::ScopeName;

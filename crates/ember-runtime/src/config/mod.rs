//! Configuration with layered merging.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌───────────────────────────────────────────┐
//! │  1. Environment Variables (EMBER_*)       │  Runtime override
//! ├───────────────────────────────────────────┤
//! │  2. Project Config (.ember/config.toml)   │  Project-specific
//! ├───────────────────────────────────────────┤
//! │  3. Explicit Config File (--config)       │  Deployment file
//! ├───────────────────────────────────────────┤
//! │  4. Default Values (compile-time)         │  Fallback
//! └───────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `EMBER_DEBUG` | `debug` | bool |
//! | `EMBER_IDLE_TIMEOUT_MS` | `engine.idle_timeout_ms` | u64 |
//! | `EMBER_MAX_CALL_DEPTH` | `engine.max_call_depth` | usize |
//! | `EMBER_MANAGER_INTERVAL_MS` | `engine.manager_interval_ms` | u64 |
//! | `EMBER_QUEUE_CAPACITY` | `engine.queue_capacity` | usize |
//! | `EMBER_POOL_CAPACITY` | `engine.pool_capacity_bytes` | usize |
//! | `EMBER_LOG_LEVEL` | `logging.level` | String |
//!
//! # Example Configuration
//!
//! ```toml
//! debug = false
//!
//! [engine]
//! idle_timeout_ms = 5000
//! max_call_depth = 20
//!
//! [logging]
//! level = "info"
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use types::{EmberConfig, EngineConfig, LoggingConfig};

/// Project-local configuration directory name.
pub const PROJECT_CONFIG_DIR: &str = ".ember";

/// Configuration file name inside [`PROJECT_CONFIG_DIR`].
pub const PROJECT_CONFIG_FILE: &str = "config.toml";

//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
///
/// This is the unified configuration after merging all layers.
///
/// # Example
///
/// ```
/// use ember_runtime::config::EmberConfig;
///
/// let config = EmberConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.engine.max_call_depth, 20);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmberConfig {
    /// Enable debug mode (verbose logging, diagnostics).
    pub debug: bool,

    /// Scope engine tuning.
    pub engine: EngineConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl EmberConfig {
    /// Serializes to TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Merges another config into this one.
    ///
    /// Values from `other` override values in `self` only if they differ from
    /// the default.
    pub fn merge(&mut self, other: &Self) {
        if other.debug != Self::default().debug {
            self.debug = other.debug;
        }
        self.engine.merge(&other.engine);
        self.logging.merge(&other.logging);
    }

    /// Checks values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()
    }
}

/// Scope engine tuning.
///
/// Zero disables the corresponding limit where noted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds an empty scope keeps its worker before stopping it (0 = never).
    pub idle_timeout_ms: u64,

    /// Maximum length of a synchronous call chain.
    pub max_call_depth: usize,

    /// Period of the manager's supervision sweep.
    pub manager_interval_ms: u64,

    /// Manager warns about scopes WAITING longer than this (0 = never).
    pub wait_warn_ms: u64,

    /// Maximum tasks queued per scope (0 = unbounded).
    pub queue_capacity: usize,

    /// Byte budget of the default slot pool (0 = unbounded).
    pub pool_capacity_bytes: usize,

    /// Worker thread stack size in bytes (0 = platform default).
    pub worker_stack_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 5_000,
            max_call_depth: 20,
            manager_interval_ms: 250,
            wait_warn_ms: 10_000,
            queue_capacity: 0,
            pool_capacity_bytes: 0,
            worker_stack_size: 0,
        }
    }
}

impl EngineConfig {
    /// Idle timeout, or `None` when auto-stop is disabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Supervision sweep period.
    #[must_use]
    pub fn manager_interval(&self) -> Duration {
        Duration::from_millis(self.manager_interval_ms.max(1))
    }

    /// Long-wait warning threshold, or `None` when disabled.
    #[must_use]
    pub fn wait_warn(&self) -> Option<Duration> {
        (self.wait_warn_ms > 0).then(|| Duration::from_millis(self.wait_warn_ms))
    }

    /// Pool budget, or `None` when unbounded.
    #[must_use]
    pub fn pool_capacity(&self) -> Option<usize> {
        (self.pool_capacity_bytes > 0).then_some(self.pool_capacity_bytes)
    }

    /// Sets the idle timeout (`Duration::ZERO` disables auto-stop).
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the maximum call-chain depth.
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Sets the per-scope queue capacity (`0` = unbounded).
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the supervision sweep period.
    #[must_use]
    pub fn with_manager_interval(mut self, interval: Duration) -> Self {
        self.manager_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the default pool budget (`0` = unbounded).
    #[must_use]
    pub fn with_pool_capacity(mut self, bytes: usize) -> Self {
        self.pool_capacity_bytes = bytes;
        self
    }

    fn merge(&mut self, other: &Self) {
        let default = Self::default();

        if other.idle_timeout_ms != default.idle_timeout_ms {
            self.idle_timeout_ms = other.idle_timeout_ms;
        }
        if other.max_call_depth != default.max_call_depth {
            self.max_call_depth = other.max_call_depth;
        }
        if other.manager_interval_ms != default.manager_interval_ms {
            self.manager_interval_ms = other.manager_interval_ms;
        }
        if other.wait_warn_ms != default.wait_warn_ms {
            self.wait_warn_ms = other.wait_warn_ms;
        }
        if other.queue_capacity != default.queue_capacity {
            self.queue_capacity = other.queue_capacity;
        }
        if other.pool_capacity_bytes != default.pool_capacity_bytes {
            self.pool_capacity_bytes = other.pool_capacity_bytes;
        }
        if other.worker_stack_size != default.worker_stack_size {
            self.worker_stack_size = other.worker_stack_size;
        }
    }

    /// Checks values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.max_call_depth",
                message: "must be at least 1".into(),
            });
        }
        if self.manager_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "engine.manager_interval_ms",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

impl LoggingConfig {
    fn merge(&mut self, other: &Self) {
        if other.level != Self::default().level {
            self.level = other.level.clone();
        }
    }
}

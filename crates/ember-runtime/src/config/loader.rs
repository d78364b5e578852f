//! Configuration loader with hierarchical merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Explicit config file (`with_config_file`)
//! 3. Project config (`<root>/.ember/config.toml`)
//! 4. Environment variables (`EMBER_*`)
//!
//! Each layer overrides the previous.

use super::{ConfigError, EmberConfig, PROJECT_CONFIG_DIR, PROJECT_CONFIG_FILE};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```no_run
/// use ember_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_project_root("/path/to/project")
///     .skip_env_vars()
///     .load()?;
/// # Ok::<(), ember_runtime::config::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Explicit config file.
    config_file: Option<PathBuf>,

    /// Project root directory.
    project_root: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip project config loading.
    skip_project: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit config file.
    ///
    /// Unlike the project file, a missing explicit file is an error.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Sets the project root directory.
    ///
    /// Project config will be loaded from `<project_root>/.ember/config.toml`.
    #[must_use]
    pub fn with_project_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_root = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips project config loading.
    #[must_use]
    pub fn skip_project_config(mut self) -> Self {
        self.skip_project = true;
        self
    }

    /// Loads, merges and validates configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a config file exists but cannot be read or
    /// parsed, the explicit file is missing, an environment variable holds an
    /// invalid value, or the merged result fails validation.
    pub fn load(&self) -> Result<EmberConfig, ConfigError> {
        self.load_with_env(|name| std::env::var(name).ok())
    }

    /// Like [`load`](Self::load), reading environment variables through `env`.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with_env<F>(&self, env: F) -> Result<EmberConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = EmberConfig::default();

        // Layer 1: explicit file
        if let Some(ref path) = self.config_file {
            if !path.exists() {
                return Err(ConfigError::read_file(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
                ));
            }
            if let Some(file_config) = load_file(path)? {
                debug!(path = %path.display(), "Loaded config file");
                config.merge(&file_config);
            }
        }

        // Layer 2: project config
        if !self.skip_project {
            if let Some(ref project_root) = self.project_root {
                let path = project_root
                    .join(PROJECT_CONFIG_DIR)
                    .join(PROJECT_CONFIG_FILE);
                if let Some(project_config) = load_file(&path)? {
                    debug!(
                        path = %path.display(),
                        project = %project_root.display(),
                        "Loaded project config"
                    );
                    config.merge(&project_config);
                }
            }
        }

        // Layer 3: environment variables
        if !self.skip_env {
            apply_env_vars(&mut config, &env)?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<EmberConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = EmberConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(Some(config))
}

fn apply_env_vars<F>(config: &mut EmberConfig, env: &F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = env("EMBER_DEBUG") {
        config.debug = parse_bool(&val)
            .ok_or_else(|| ConfigError::invalid_env_var("EMBER_DEBUG", "expected bool"))?;
    }

    parse_env_number(env, "EMBER_IDLE_TIMEOUT_MS", &mut config.engine.idle_timeout_ms)?;
    parse_env_number(env, "EMBER_MAX_CALL_DEPTH", &mut config.engine.max_call_depth)?;
    parse_env_number(
        env,
        "EMBER_MANAGER_INTERVAL_MS",
        &mut config.engine.manager_interval_ms,
    )?;
    parse_env_number(env, "EMBER_QUEUE_CAPACITY", &mut config.engine.queue_capacity)?;
    parse_env_number(
        env,
        "EMBER_POOL_CAPACITY",
        &mut config.engine.pool_capacity_bytes,
    )?;

    if let Some(val) = env("EMBER_LOG_LEVEL") {
        config.logging.level = val;
    }

    Ok(())
}

fn parse_env_number<F, N>(env: &F, name: &str, field: &mut N) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    N: FromStr,
{
    if let Some(val) = env(name) {
        *field = val
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid_env_var(name, "expected unsigned integer"))?;
    }
    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

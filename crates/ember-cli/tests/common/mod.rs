//! Shared E2E test helpers for `ember` binary tests.

use assert_cmd::cargo::cargo_bin_cmd;
use std::time::Duration;

/// Default timeout for CLI tests.
pub const TIMEOUT_BASIC: Duration = Duration::from_secs(30);

/// Environment variables read by the config loader.
///
/// Removed so a developer's shell settings cannot change test outcomes.
const EMBER_VARS: &[&str] = &[
    "EMBER_DEBUG",
    "EMBER_IDLE_TIMEOUT_MS",
    "EMBER_MAX_CALL_DEPTH",
    "EMBER_MANAGER_INTERVAL_MS",
    "EMBER_QUEUE_CAPACITY",
    "EMBER_POOL_CAPACITY",
    "EMBER_LOG_LEVEL",
    "RUST_LOG",
];

/// Build a Command for the `ember` binary rooted in a fresh project directory.
///
/// Returns (command, _guard) — keep the guard alive for the test's duration.
pub fn ember_cmd() -> (assert_cmd::Command, tempfile::TempDir) {
    let tmp = tempfile::tempdir().expect("create temp project dir");
    let mut cmd: assert_cmd::Command = cargo_bin_cmd!("ember");
    cmd.timeout(TIMEOUT_BASIC);
    for var in EMBER_VARS {
        cmd.env_remove(var);
    }
    cmd.args(["-C", tmp.path().to_str().expect("valid utf8")]);
    (cmd, tmp)
}

/// Writes `.ember/config.toml` under the project root.
pub fn write_project_config(root: &std::path::Path, content: &str) {
    let dir = root.join(".ember");
    std::fs::create_dir_all(&dir).expect("create .ember dir");
    std::fs::write(dir.join("config.toml"), content).expect("write project config");
}

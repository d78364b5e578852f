//! Ember CLI - drive the scope engine from the command line.
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`EMBER_*`)
//! 3. Project config (`.ember/config.toml` under `--project`, default: current directory)
//! 4. Explicit config file (`--config`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `EMBER_DEBUG`: Enable debug mode (`true`/`false`)
//! - `EMBER_IDLE_TIMEOUT_MS`: Idle worker timeout (0 disables)
//! - `EMBER_MAX_CALL_DEPTH`: Synchronous call chain limit
//! - `EMBER_MANAGER_INTERVAL_MS`: Manager sweep interval
//! - `EMBER_QUEUE_CAPACITY`: Per-scope queue bound (0 = unbounded)
//! - `EMBER_POOL_CAPACITY`: Task storage budget in bytes (0 = unbounded)
//! - `EMBER_LOG_LEVEL`: Default log filter when `RUST_LOG` is unset

mod scenario;

use anyhow::Result;
use clap::{Parser, Subcommand};
use ember_runtime::{ConfigLoader, EmberConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Ember - named-scope task engine
#[derive(Parser, Debug)]
#[command(name = "ember")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Explicit config file
    #[arg(short, long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Project root directory (defaults to current directory)
    #[arg(short = 'C', long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the resolved configuration as TOML
    Config,

    /// Run the main → device → main call scenario
    Demo,

    /// Fan calls across scopes and verify per-scope ordering
    Stress {
        /// Number of scopes
        #[arg(long, default_value_t = 4)]
        scopes: usize,

        /// Calls submitted to each scope
        #[arg(long, default_value_t = 100)]
        tasks: usize,
    },
}

fn resolve_config(args: &Args) -> Result<EmberConfig> {
    let project_root = args.project.clone().unwrap_or_else(|| {
        std::env::current_dir().unwrap_or_else(|e| {
            eprintln!("Warning: failed to get current directory ({e}), using '.'");
            PathBuf::from(".")
        })
    });

    let mut loader = ConfigLoader::new().with_project_root(project_root);
    if let Some(ref path) = args.config {
        loader = loader.with_config_file(path);
    }
    let mut config = loader
        .load()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    // CLI args override (highest priority)
    if args.debug {
        config.debug = true;
    }
    Ok(config)
}

fn init_tracing(args: &Args, config: &EmberConfig) {
    // --debug > --verbose > RUST_LOG env > logging.level (default "warn")
    let filter = if config.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };

    // Diagnostics go to stderr; stdout carries command output only.
    let layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);
    tracing_subscriber::registry().with(layer).init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;
    init_tracing(&args, &config);

    info!(
        idle_timeout_ms = config.engine.idle_timeout_ms,
        max_call_depth = config.engine.max_call_depth,
        "configuration resolved"
    );

    match args.command {
        Command::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::Demo => scenario::demo(&config.engine),
        Command::Stress { scopes, tasks } => scenario::stress(&config.engine, scopes, tasks),
    }
}

//! # EVO Signals Binary
//!
//! Loads an application file, binds every module, builds the brokers and
//! prints the resulting memory plan.
//!
//! # Usage
//!
//! ```bash
//! # Configure and print the layout
//! evo_signals --config config/pid_loop.toml
//!
//! # Enter a state first (applies defaults, swaps buffers)
//! evo_signals --config config/pid_loop.toml --state Run
//!
//! # Machine-readable plan, verbose logs
//! evo_signals --config config/pid_loop.toml --json -v
//! ```

#![deny(warnings)]

use clap::Parser;
use evo_signals::application::RealTimeApplication;
use evo_signals::config::{ApplicationConfig, ConfigLoader, LogLevel};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// EVO Signals - signal binding and memory layout of real-time modules
#[derive(Parser, Debug)]
#[command(name = "evo_signals")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Binds module signals to shared data sources and prints the memory plan")]
#[command(long_about = None)]
struct Args {
    /// Path to the application file
    #[arg(short, long, default_value = "/etc/evo/signals.toml")]
    config: PathBuf,

    /// Transition into this state before printing the plan
    #[arg(short, long)]
    state: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs and the plan in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    if let Err(e) = run() {
        error!("evo_signals failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = ApplicationConfig::load(&args.config);
    let log_level = config
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);

    info!("EVO Signals v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Application file {:?}", args.config);

    let config = config?;
    let mut app = RealTimeApplication::from_config(&config)?;
    app.configure()?;

    if let Some(state) = args.state.as_deref() {
        app.prepare_next_state(state)?;
        app.change_state()?;
    }

    let plan = app.memory_plan();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{plan}");
    }
    Ok(())
}

/// `-v` forces debug, otherwise the `[shared] log_level` of the file.
fn base_directive(verbose: bool, configured: LogLevel) -> &'static str {
    if verbose {
        LogLevel::Debug.as_directive()
    } else {
        configured.as_directive()
    }
}

/// Setup tracing subscriber based on CLI arguments and the file's level.
///
/// `RUST_LOG` still takes precedence. Logs go to stderr so the plan on
/// stdout stays parseable.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(base_directive(args.verbose, configured)));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

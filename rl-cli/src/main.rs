//! Ridgeline CLI (ridgeline)
//!
//! Operator front end for the fingerprint engine. Logging is configured from
//! `RIDGELINE_LOG` and written to stderr so that command output stays valid
//! JSON.

mod cli;

use clap::Parser;
use tracing::error;

use rl_core::constants::env;
use rl_error::RidgelineError;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let log_level = std::env::var(env::LOG).unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_env_filter(&log_level)
        .init();

    tracing::debug!("ridgeline {} starting", VERSION);

    let cli_args = cli::Cli::parse();
    if let Err(e) = cli::run_cli(&cli_args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(exit_code(&e));
    }
}

/// 2 when the scanner or the store could not be reached, 1 for everything else
fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<RidgelineError>() {
        Some(e) if e.is_operational() => 2,
        _ => 1,
    }
}

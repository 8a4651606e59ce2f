//! `rubiks-cube-solver` binary.
//!
//! Without a subcommand this runs the service: worker pool, WebSocket
//! server and static HTTP server on a single-threaded event loop. The
//! hidden `worker` subcommand is what the pool launches for each worker
//! process.

// ============================================================================
// Imports
// ============================================================================

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rubiks_cube_solver::config::Cli;
use rubiks_cube_solver::solver::SearchSolver;
use rubiks_cube_solver::worker::runtime;
use rubiks_cube_solver::{Result, Supervisor};

// ============================================================================
// Constants
// ============================================================================

/// Log filter used when neither `--log-level` nor `RUST_LOG` is set.
const DEFAULT_LOG_FILTER: &str = "rubiks_cube_solver=info";

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let result = if cli.is_worker() {
        run_worker()
    } else {
        run_server(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr; a worker's stdout is its protocol channel.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run_worker() -> Result<()> {
    let solver = SearchSolver::new();
    runtime::run(io::stdin().lock(), io::stdout().lock(), &solver)
}

fn run_server(cli: &Cli) -> Result<()> {
    let config = cli.to_server_config()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let services = Supervisor::start(config).await?;
        info!(
            ws = %services.ws_addr(),
            http = %services.http_addr(),
            "Ready, press Ctrl+C to stop"
        );
        services.wait_for_signal().await
    })
}

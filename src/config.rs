//! Startup configuration.
//!
//! Configuration is read once at process start from command-line flags
//! (with `RUBIKS_*` environment fallbacks) and frozen into [`ServerConfig`]
//! and [`PoolConfig`]. Nothing is reloaded while running; the search depth
//! bound in particular lives only in [`PoolConfig`] and is copied into every
//! submission.
//!
//! # Flags
//!
//! | Flag | Env | Default |
//! |------|-----|---------|
//! | `--directory` | `RUBIKS_DIRECTORY` | `./rubiks-cube-gui/dist` |
//! | `--host` / `--port` | `RUBIKS_HOST` / `RUBIKS_PORT` | `0.0.0.0:80` |
//! | `--ws-host` / `--ws-port` | `RUBIKS_WS_HOST` / `RUBIKS_WS_PORT` | `0.0.0.0:8080` |
//! | `--max-depth` | `RUBIKS_MAX_DEPTH` | 20 |
//! | `--max-workers` | `RUBIKS_MAX_WORKERS` | available parallelism |
//! | `--queue-capacity` | `RUBIKS_QUEUE_CAPACITY` | unbounded |
//! | `--solve-timeout-ms` | `RUBIKS_SOLVE_TIMEOUT_MS` | none |
//! | `--shutdown-grace-ms` | `RUBIKS_SHUTDOWN_GRACE_MS` | 5000 |
//! | `--log-level` | `RUBIKS_LOG_LEVEL` | `RUST_LOG`, else `rubiks_cube_solver=info` |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default static asset root.
pub const DEFAULT_STATIC_ROOT: &str = "./rubiks-cube-gui/dist";

/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Default WebSocket port.
pub const DEFAULT_WS_PORT: u16 = 8080;

/// Default search depth bound.
pub const DEFAULT_MAX_DEPTH: u8 = 20;

/// Default shutdown grace period in milliseconds.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 5000;

/// Default delay before retrying a failed worker spawn.
pub const DEFAULT_RESPAWN_BACKOFF: Duration = Duration::from_millis(250);

/// Subcommand that turns the binary into a worker process.
pub const WORKER_SUBCOMMAND: &str = "worker";

// ============================================================================
// Cli
// ============================================================================

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "rubiks-cube-solver", version, about)]
pub struct Cli {
    /// Run mode; absent for the server.
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Directory served by the static HTTP server.
    #[arg(long, env = "RUBIKS_DIRECTORY", default_value = DEFAULT_STATIC_ROOT)]
    pub directory: PathBuf,

    /// HTTP listen address.
    #[arg(long, env = "RUBIKS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// HTTP listen port.
    #[arg(long, env = "RUBIKS_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub port: u16,

    /// WebSocket listen address.
    #[arg(long, env = "RUBIKS_WS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub ws_host: IpAddr,

    /// WebSocket listen port.
    #[arg(long, env = "RUBIKS_WS_PORT", default_value_t = DEFAULT_WS_PORT)]
    pub ws_port: u16,

    /// Maximum search depth passed to the solver.
    #[arg(
        long,
        env = "RUBIKS_MAX_DEPTH",
        default_value_t = DEFAULT_MAX_DEPTH,
        value_parser = clap::value_parser!(u8).range(1..)
    )]
    pub max_depth: u8,

    /// Number of worker processes.
    #[arg(long, env = "RUBIKS_MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Reject submissions once this many items are waiting.
    #[arg(long, env = "RUBIKS_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Kill a worker that takes longer than this on one item.
    #[arg(long, env = "RUBIKS_SOLVE_TIMEOUT_MS")]
    pub solve_timeout_ms: Option<u64>,

    /// Time allowed for sessions and workers to stop on shutdown.
    #[arg(long, env = "RUBIKS_SHUTDOWN_GRACE_MS", default_value_t = DEFAULT_SHUTDOWN_GRACE_MS)]
    pub shutdown_grace_ms: u64,

    /// Log filter directive, e.g. `debug` or `rubiks_cube_solver=trace`.
    #[arg(long, env = "RUBIKS_LOG_LEVEL")]
    pub log_level: Option<String>,
}

/// Run modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve solve requests on stdin/stdout (spawned by the pool).
    #[command(hide = true)]
    Worker,
}

impl Cli {
    /// Returns `true` when running as a worker process.
    #[inline]
    #[must_use]
    pub fn is_worker(&self) -> bool {
        self.command == Some(Command::Worker)
    }

    /// Builds the server configuration.
    ///
    /// Workers are spawned from the current executable and inherit the
    /// `--log-level` flag.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerSpawn`] if the current executable cannot be located
    /// - [`Error::Config`] if a value is out of range
    pub fn to_server_config(&self) -> Result<ServerConfig> {
        let mut worker_command = WorkerCommand::current_exe()?;
        if let Some(level) = &self.log_level {
            worker_command = WorkerCommand::new(worker_command.program().clone())
                .arg("--log-level")
                .arg(level.clone())
                .arg(WORKER_SUBCOMMAND);
        }

        let mut pool = PoolConfig::new(worker_command).with_max_depth(self.max_depth);
        if let Some(count) = self.max_workers {
            pool = pool.with_worker_count(count);
        }
        if let Some(capacity) = self.queue_capacity {
            pool = pool.with_queue_capacity(capacity);
        }
        if let Some(ms) = self.solve_timeout_ms {
            pool = pool.with_solve_timeout(Duration::from_millis(ms));
        }

        let config = ServerConfig {
            http_addr: SocketAddr::new(self.host, self.port),
            ws_addr: SocketAddr::new(self.ws_host, self.ws_port),
            static_root: self.directory.clone(),
            pool,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        };
        config.validate()?;

        Ok(config)
    }
}

// ============================================================================
// WorkerCommand
// ============================================================================

/// How to launch one worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    /// Creates a command with no arguments.
    #[inline]
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// The running binary in worker mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerSpawn`] if the executable path is unavailable.
    pub fn current_exe() -> Result<Self> {
        let program = std::env::current_exe()
            .map_err(|e| Error::worker_spawn(format!("cannot locate current executable: {e}")))?;
        Ok(Self::new(program).arg(WORKER_SUBCOMMAND))
    }

    /// Appends an argument.
    #[inline]
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Returns the program path.
    #[inline]
    #[must_use]
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Returns the arguments.
    #[inline]
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

// ============================================================================
// PoolConfig
// ============================================================================

/// Worker pool settings, immutable once the pool starts.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    worker_count: usize,
    max_depth: u8,
    queue_capacity: Option<usize>,
    solve_timeout: Option<Duration>,
    respawn_backoff: Duration,
    worker_command: WorkerCommand,
}

impl PoolConfig {
    /// Creates a configuration with one worker per available CPU.
    #[must_use]
    pub fn new(worker_command: WorkerCommand) -> Self {
        let worker_count = thread::available_parallelism().map_or(1, NonZeroUsize::get);

        Self {
            worker_count,
            max_depth: DEFAULT_MAX_DEPTH,
            queue_capacity: None,
            solve_timeout: None,
            respawn_backoff: DEFAULT_RESPAWN_BACKOFF,
            worker_command,
        }
    }

    /// Sets the number of worker processes.
    #[inline]
    #[must_use]
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Sets the search depth bound applied to every item.
    #[inline]
    #[must_use]
    pub fn with_max_depth(mut self, depth: u8) -> Self {
        self.max_depth = depth;
        self
    }

    /// Bounds the queue of waiting items.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Sets the per-item deadline.
    #[inline]
    #[must_use]
    pub fn with_solve_timeout(mut self, timeout: Duration) -> Self {
        self.solve_timeout = Some(timeout);
        self
    }

    /// Sets the delay between failed spawn attempts.
    #[inline]
    #[must_use]
    pub fn with_respawn_backoff(mut self, backoff: Duration) -> Self {
        self.respawn_backoff = backoff;
        self
    }

    /// Number of worker processes.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Search depth bound.
    #[inline]
    #[must_use]
    pub fn max_depth(&self) -> u8 {
        self.max_depth
    }

    /// Queue bound, if any.
    #[inline]
    #[must_use]
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    /// Per-item deadline, if any.
    #[inline]
    #[must_use]
    pub fn solve_timeout(&self) -> Option<Duration> {
        self.solve_timeout
    }

    /// Delay between failed spawn attempts.
    #[inline]
    #[must_use]
    pub fn respawn_backoff(&self) -> Duration {
        self.respawn_backoff
    }

    /// Worker launch command.
    #[inline]
    #[must_use]
    pub fn worker_command(&self) -> &WorkerCommand {
        &self.worker_command
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(Error::config("max-workers must be at least 1"));
        }
        if self.max_depth == 0 {
            return Err(Error::config("max-depth must be at least 1"));
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::config("queue-capacity must be at least 1"));
        }
        if self.solve_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("solve-timeout-ms must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

/// Everything the supervisor needs to start the service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Static HTTP listen address.
    pub http_addr: SocketAddr,
    /// WebSocket listen address.
    pub ws_addr: SocketAddr,
    /// Static asset root.
    pub static_root: PathBuf,
    /// Worker pool settings.
    pub pool: PoolConfig,
    /// Time allowed for an orderly shutdown.
    pub shutdown_grace: Duration,
}

impl ServerConfig {
    /// Creates a configuration with default addresses.
    #[must_use]
    pub fn new(pool: PoolConfig) -> Self {
        let any = IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        Self {
            http_addr: SocketAddr::new(any, DEFAULT_HTTP_PORT),
            ws_addr: SocketAddr::new(any, DEFAULT_WS_PORT),
            static_root: PathBuf::from(DEFAULT_STATIC_ROOT),
            pool,
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.pool.validate()?;
        if self.http_addr == self.ws_addr && self.http_addr.port() != 0 {
            return Err(Error::config(format!(
                "HTTP and WebSocket servers cannot share {}",
                self.http_addr
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("rubiks-cube-solver").chain(args.iter().copied()))
            .expect("valid arguments")
    }

    #[test]
    fn test_cli_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.port, 80);
        assert_eq!(cli.ws_port, 8080);
        assert_eq!(cli.max_depth, 20);
        assert_eq!(cli.directory, PathBuf::from(DEFAULT_STATIC_ROOT));
        assert!(!cli.is_worker());
    }

    #[test]
    fn test_cli_worker_subcommand() {
        assert!(parse(&["worker"]).is_worker());
        assert!(parse(&["--log-level", "debug", "worker"]).is_worker());
    }

    #[test]
    fn test_cli_rejects_zero_depth() {
        let result = Cli::try_parse_from(["rubiks-cube-solver", "--max-depth", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_to_server_config() {
        let cli = parse(&[
            "--port",
            "8000",
            "--ws-port",
            "9000",
            "--max-workers",
            "3",
            "--queue-capacity",
            "16",
            "--max-depth",
            "12",
        ]);
        let config = cli.to_server_config().expect("valid config");

        assert_eq!(config.http_addr.port(), 8000);
        assert_eq!(config.ws_addr.port(), 9000);
        assert_eq!(config.pool.worker_count(), 3);
        assert_eq!(config.pool.queue_capacity(), Some(16));
        assert_eq!(config.pool.max_depth(), 12);
        assert_eq!(config.pool.worker_command().args(), ["worker"]);
    }

    #[test]
    fn test_log_level_is_forwarded_to_workers() {
        let cli = parse(&["--log-level", "debug"]);
        let config = cli.to_server_config().expect("valid config");
        assert_eq!(
            config.pool.worker_command().args(),
            ["--log-level", "debug", "worker"]
        );
    }

    #[test]
    fn test_pool_validation() {
        let command = WorkerCommand::new("/bin/true");

        assert!(PoolConfig::new(command.clone()).validate().is_ok());
        assert!(
            PoolConfig::new(command.clone())
                .with_worker_count(0)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::new(command.clone())
                .with_max_depth(0)
                .validate()
                .is_err()
        );
        assert!(
            PoolConfig::new(command)
                .with_queue_capacity(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_same_listen_address_rejected() {
        let mut config = ServerConfig::new(PoolConfig::new(WorkerCommand::new("/bin/true")));
        config.ws_addr = config.http_addr;
        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }
}

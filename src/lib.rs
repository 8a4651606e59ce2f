//! Rubik's cube solving service.
//!
//! Serves a static web front-end over HTTP and solves scrambles sent over
//! WebSocket. Solving is CPU-bound and runs in a pool of worker processes,
//! so the connection event loop never blocks on it.
//!
//! # Architecture
//!
//! - A single-threaded event loop multiplexes every connection.
//! - Each connection is a [`Session`](transport::Session) that handles one
//!   request at a time, so replies keep request order.
//! - Sessions submit work to the [`WorkerPool`]; idle worker processes
//!   take items from one shared queue.
//! - A worker that crashes or hangs is replaced and its item resolves as a
//!   failure instead of hanging the caller.
//!
//! # Wire Format
//!
//! Each inbound WebSocket text message is a scramble, either a move
//! sequence (`R U R' U'`) or a 54-character facelet string. Replies:
//!
//! | Outcome | Payload |
//! |---------|---------|
//! | Solved | `{"time":0.004,"solution":"U R U' R'"}` |
//! | Invalid scramble | `invalid` |
//! | Service failure | `{"error":"worker_failure","message":"..."}` |
//!
//! # Quick Start
//!
//! ```no_run
//! use rubiks_cube_solver::{PoolConfig, Result, ServerConfig, Supervisor, WorkerCommand};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<()> {
//!     let pool = PoolConfig::new(WorkerCommand::current_exe()?).with_worker_count(4);
//!     let services = Supervisor::start(ServerConfig::new(pool)).await?;
//!     services.wait_for_signal().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`config`] | CLI and startup configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`http`] | Static HTTP server with `/solve` |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Reply payloads and worker messages |
//! | [`shutdown`] | Stop signal and OS signal handling |
//! | [`solver`] | Solver adapter and bundled search |
//! | [`supervisor`] | Starts and stops the whole service |
//! | [`transport`] | WebSocket server and sessions |
//! | [`worker`] | Worker pool and worker processes |

// ============================================================================
// Modules
// ============================================================================

/// Command-line interface and startup configuration.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Static HTTP server.
pub mod http;

/// Type-safe identifiers for sessions, workers and jobs.
pub mod identifiers;

/// Wire formats.
pub mod protocol;

/// Shutdown signalling.
pub mod shutdown;

/// Solver adapter, cube model and bundled search.
pub mod solver;

/// Process supervisor.
pub mod supervisor;

/// WebSocket server and per-connection sessions.
pub mod transport;

/// Worker pool, worker processes and the worker-side loop.
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

// Configuration
pub use config::{Cli, PoolConfig, ServerConfig, WorkerCommand};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{JobId, SessionId, WorkerId};

// Protocol types
pub use protocol::{ErrorKind, Reply};

// Solver types
pub use solver::{SearchSolver, SolveError, SolveOutcome, Solver, solve_timed};

// Service types
pub use supervisor::{RunningServices, Supervisor};
pub use transport::SolveServer;
pub use worker::{SolveHandle, WorkerPool};

//! Error types for the solving service.
//!
//! This module defines the crate-wide error type. Solver rejections are
//! *not* errors: they are ordinary [`SolveOutcome::Invalid`] values produced
//! at the solver boundary, see [`crate::solver`].
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use rubiks_cube_solver::{Result, WorkerPool, PoolConfig};
//!
//! async fn example(config: PoolConfig) -> Result<()> {
//!     let pool = WorkerPool::start(config)?;
//!     let outcome = pool.submit("R U R' U'")?.outcome().await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Startup | [`Error::Config`], [`Error::Bind`], [`Error::ServerExited`] |
//! | Worker | [`Error::WorkerSpawn`], [`Error::WorkerExited`], [`Error::WorkerProtocol`], [`Error::WorkerTimeout`] |
//! | Pool | [`Error::PoolSaturated`], [`Error::PoolShutdown`], [`Error::Cancelled`] |
//! | Transport | [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | External | [`Error::Io`], [`Error::Json`] |
//!
//! [`SolveOutcome::Invalid`]: crate::solver::SolveOutcome::Invalid

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::error::ProtocolError;

use crate::identifiers::WorkerId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Startup Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when command-line or builder configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Failed to bind a listening socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying IO error.
        source: IoError,
    },

    /// A server task ended without a shutdown request.
    #[error("{server} server exited: {reason}")]
    ServerExited {
        /// Which server stopped.
        server: &'static str,
        /// Why it stopped.
        reason: String,
    },

    // ========================================================================
    // Worker Errors
    // ========================================================================
    /// Failed to launch a worker process.
    #[error("Failed to spawn worker: {message}")]
    WorkerSpawn {
        /// Description of the launch failure.
        message: String,
    },

    /// Worker process exited (or closed its pipes) mid-item.
    #[error("Worker {worker_id} exited unexpectedly")]
    WorkerExited {
        /// The worker that died.
        worker_id: WorkerId,
    },

    /// Worker sent something that is not a valid reply.
    #[error("Worker protocol error: {message}")]
    WorkerProtocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Worker did not answer within the configured solve timeout.
    #[error("Worker {worker_id} timed out after {timeout_ms}ms")]
    WorkerTimeout {
        /// The worker that was killed.
        worker_id: WorkerId,
        /// Milliseconds waited before giving up.
        timeout_ms: u64,
    },

    // ========================================================================
    // Pool Errors
    // ========================================================================
    /// Submission rejected because the bounded queue is full.
    #[error("Worker pool saturated ({capacity} items queued)")]
    PoolSaturated {
        /// Configured queue capacity.
        capacity: usize,
    },

    /// Submission rejected because the pool has been shut down.
    #[error("Worker pool is shut down")]
    PoolShutdown,

    /// The work item was dropped before producing an outcome.
    #[error("Work item cancelled")]
    Cancelled,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection closed by the remote end.
    #[error("Connection closed")]
    ConnectionClosed,

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a bind error.
    #[inline]
    pub fn bind(addr: SocketAddr, source: IoError) -> Self {
        Self::Bind { addr, source }
    }

    /// Creates a server exited error.
    #[inline]
    pub fn server_exited(server: &'static str, reason: impl Into<String>) -> Self {
        Self::ServerExited {
            server,
            reason: reason.into(),
        }
    }

    /// Classifies a WebSocket failure.
    ///
    /// A peer that closed or reset the connection becomes
    /// [`Error::ConnectionClosed`]; anything else stays [`Error::WebSocket`].
    pub fn transport(err: WsError) -> Self {
        match &err {
            WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
                Self::ConnectionClosed
            }
            WsError::Io(io)
                if matches!(
                    io.kind(),
                    IoErrorKind::ConnectionReset
                        | IoErrorKind::ConnectionAborted
                        | IoErrorKind::BrokenPipe
                        | IoErrorKind::UnexpectedEof
                ) =>
            {
                Self::ConnectionClosed
            }
            _ => Self::WebSocket(err),
        }
    }

    /// Creates a worker spawn error.
    #[inline]
    pub fn worker_spawn(message: impl Into<String>) -> Self {
        Self::WorkerSpawn {
            message: message.into(),
        }
    }

    /// Creates a worker exited error.
    #[inline]
    pub fn worker_exited(worker_id: WorkerId) -> Self {
        Self::WorkerExited { worker_id }
    }

    /// Creates a worker protocol error.
    #[inline]
    pub fn worker_protocol(message: impl Into<String>) -> Self {
        Self::WorkerProtocol {
            message: message.into(),
        }
    }

    /// Creates a worker timeout error.
    ///
    /// Limits too long for `u64` milliseconds saturate.
    #[inline]
    pub fn worker_timeout(worker_id: WorkerId, limit: Duration) -> Self {
        Self::WorkerTimeout {
            worker_id,
            timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Creates a pool saturated error.
    #[inline]
    pub fn pool_saturated(capacity: usize) -> Self {
        Self::PoolSaturated { capacity }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if the error means a worker process misbehaved.
    ///
    /// These are reported to clients as a generic failure payload.
    #[inline]
    #[must_use]
    pub fn is_worker_failure(&self) -> bool {
        matches!(
            self,
            Self::WorkerSpawn { .. }
                | Self::WorkerExited { .. }
                | Self::WorkerProtocol { .. }
                | Self::WorkerTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection-level error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::WebSocket(_))
    }

    /// Returns `true` if the error should terminate the process.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::Bind { .. } | Self::ServerExited { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

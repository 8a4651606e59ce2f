//! Client-facing reply payloads.
//!
//! Every request on the WebSocket channel (and `GET /solve`) is answered
//! with exactly one of three payloads:
//!
//! | Payload | Wire form |
//! |---------|-----------|
//! | Solved | `{"time":0.012,"solution":"R U R' U'"}` |
//! | Invalid | `invalid` (bare token, not JSON) |
//! | Error | `{"error":"worker_failure","message":"..."}` |
//!
//! A client can branch on the first byte: `i` is invalid, and a JSON object
//! is either a solution (has `solution`) or an error (has `error`).

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::solver::SolveOutcome;

// ============================================================================
// Constants
// ============================================================================

/// Exact payload sent for a rejected scramble.
pub const INVALID_TOKEN: &str = "invalid";

// ============================================================================
// ErrorKind
// ============================================================================

/// Category of a service-side failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The worker crashed, timed out or misbehaved.
    WorkerFailure,
    /// The bounded queue was full.
    PoolSaturated,
    /// The service is shutting down.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WorkerFailure => "worker_failure",
            Self::PoolSaturated => "pool_saturated",
            Self::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Payload Structs
// ============================================================================

#[derive(Serialize, Deserialize)]
struct SolvedPayload {
    time: f64,
    solution: String,
}

#[derive(Serialize, Deserialize)]
struct ErrorPayload {
    error: ErrorKind,
    message: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonPayload {
    Solved(SolvedPayload),
    Error(ErrorPayload),
}

// ============================================================================
// Reply
// ============================================================================

/// One reply to one scramble request.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Scramble solved.
    Solved {
        /// Solve duration in seconds.
        time: f64,
        /// Space-separated moves, `""` for an already solved cube.
        solution: String,
    },

    /// Scramble rejected.
    Invalid,

    /// Service-side failure.
    Error {
        /// Failure category.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl Reply {
    /// Creates an error reply.
    #[inline]
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Converts a solve outcome into its reply.
    ///
    /// Failure reasons are not forwarded; they are logged where they occur.
    #[must_use]
    pub fn from_outcome(outcome: SolveOutcome) -> Self {
        match outcome {
            SolveOutcome::Solved {
                solution,
                elapsed_seconds,
            } => Self::Solved {
                time: elapsed_seconds,
                solution,
            },
            SolveOutcome::Invalid { .. } => Self::Invalid,
            SolveOutcome::WorkerFailure { .. } => {
                Self::error(ErrorKind::WorkerFailure, "solver worker failed")
            }
        }
    }

    /// Converts a pool error into its reply.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::PoolSaturated { .. } => Self::error(ErrorKind::PoolSaturated, error.to_string()),
            Error::PoolShutdown | Error::Cancelled => {
                Self::error(ErrorKind::Unavailable, "service is shutting down")
            }
            _ => Self::error(ErrorKind::WorkerFailure, "solver worker failed"),
        }
    }

    /// Encodes the reply as a text payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        let text = match self {
            Self::Invalid => INVALID_TOKEN.to_string(),
            Self::Solved { time, solution } => serde_json::to_string(&SolvedPayload {
                time: *time,
                solution: solution.clone(),
            })?,
            Self::Error { kind, message } => serde_json::to_string(&ErrorPayload {
                error: *kind,
                message: message.clone(),
            })?,
        };
        Ok(text)
    }

    /// Parses a text payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is neither the invalid token nor
    /// a known JSON payload.
    pub fn decode(text: &str) -> Result<Self> {
        if text == INVALID_TOKEN {
            return Ok(Self::Invalid);
        }

        let reply = match serde_json::from_str::<JsonPayload>(text)? {
            JsonPayload::Solved(p) => Self::Solved {
                time: p.time,
                solution: p.solution,
            },
            JsonPayload::Error(p) => Self::Error {
                kind: p.error,
                message: p.message,
            },
        };
        Ok(reply)
    }

    /// Returns `true` for [`Reply::Invalid`].
    #[inline]
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    /// Returns the solution, if solved.
    #[inline]
    #[must_use]
    pub fn solution(&self) -> Option<&str> {
        match self {
            Self::Solved { solution, .. } => Some(solution),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

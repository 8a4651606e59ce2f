//! Worker-process side of the protocol.
//!
//! A worker reads [`WorkerRequest`] lines from stdin, solves each one with
//! a long-lived [`Solver`], and writes one [`WorkerReply`] line per request.
//! It exits when stdin closes.

// ============================================================================
// Imports
// ============================================================================

use std::io::{BufRead, Write};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::protocol::{WorkerReply, WorkerRequest};
use crate::solver::{Solver, solve_timed};

// ============================================================================
// Runtime
// ============================================================================

/// Serves requests until `reader` is exhausted.
///
/// # Errors
///
/// - [`Error::WorkerProtocol`] on a line that is not a request
/// - [`Error::Io`] if reading or writing fails
pub fn run(reader: impl BufRead, mut writer: impl Write, solver: &dyn Solver) -> Result<()> {
    info!(pid = std::process::id(), "Worker ready");

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let request: WorkerRequest = serde_json::from_str(&line)
            .map_err(|e| Error::worker_protocol(format!("unreadable request: {e}")))?;
        debug!(job_id = %request.id, "Solving");

        let outcome = solve_timed(solver, &request.scramble, request.max_depth);
        let reply = WorkerReply {
            id: request.id,
            outcome,
        };

        writer.write_all(reply.to_line()?.as_bytes())?;
        writer.flush()?;
    }

    info!("Input closed, worker exiting");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

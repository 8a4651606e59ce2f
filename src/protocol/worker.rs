//! Pool-to-worker messages.
//!
//! The pool and each worker process exchange newline-delimited JSON over
//! the worker's stdin and stdout, strictly one request then one reply:
//!
//! ```text
//! > {"id":7,"scramble":"R U R' U'","max_depth":20}
//! < {"id":7,"outcome":{"status":"solved","solution":"U R U' R'","elapsed_seconds":0.004}}
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::identifiers::JobId;
use crate::solver::SolveOutcome;

// ============================================================================
// WorkerRequest
// ============================================================================

/// One work item sent to a worker process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Correlation ID echoed in the reply.
    pub id: JobId,
    /// Raw scramble text from the client.
    pub scramble: String,
    /// Search bound from the pool configuration.
    pub max_depth: u8,
}

impl WorkerRequest {
    /// Encodes the request as one line, including the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// ============================================================================
// WorkerReply
// ============================================================================

/// A worker's answer to one [`WorkerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerReply {
    /// ID of the request being answered.
    pub id: JobId,
    /// Classified solve result.
    pub outcome: SolveOutcome,
}

impl WorkerReply {
    /// Encodes the reply as one line, including the trailing newline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parses a reply line and checks it answers `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerProtocol`] if the line is not a reply or
    /// carries a different ID.
    pub fn parse_for(line: &str, expected: JobId) -> Result<Self> {
        let reply: Self = serde_json::from_str(line.trim_end())
            .map_err(|e| Error::worker_protocol(format!("unreadable reply: {e}")))?;

        if reply.id != expected {
            return Err(Error::worker_protocol(format!(
                "reply for job {} while waiting for job {expected}",
                reply.id
            )));
        }

        Ok(reply)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_format() {
        let request = WorkerRequest {
            id: JobId::from_u64(7),
            scramble: "R U".to_string(),
            max_depth: 20,
        };
        assert_eq!(
            request.to_line().unwrap(),
            "{\"id\":7,\"scramble\":\"R U\",\"max_depth\":20}\n"
        );
    }

    #[test]
    fn test_parse_matching_reply() {
        let line = r#"{"id":3,"outcome":{"status":"invalid","reason":"x"}}"#;
        let reply = WorkerReply::parse_for(line, JobId::from_u64(3)).unwrap();
        assert!(reply.outcome.is_invalid());
    }

    #[test]
    fn test_parse_rejects_mismatched_id() {
        let line = r#"{"id":4,"outcome":{"status":"invalid","reason":"x"}}"#;
        let err = WorkerReply::parse_for(line, JobId::from_u64(3)).unwrap_err();
        assert!(matches!(err, Error::WorkerProtocol { .. }));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = WorkerReply::parse_for("Segmentation fault", JobId::from_u64(1)).unwrap_err();
        assert!(err.is_worker_failure());
    }
}

//! Solver adapter.
//!
//! The solving routine is a synchronous, CPU-bound function behind the
//! [`Solver`] trait. [`solve_timed`] wraps one call: it measures wall time
//! and turns every result into a [`SolveOutcome`] value, so that an
//! invalid scramble is ordinary data rather than a propagating fault.
//!
//! # Outcome Mapping
//!
//! | Solver result | Outcome |
//! |---------------|---------|
//! | `Ok(solution)` | [`SolveOutcome::Solved`] |
//! | `Err(SolveError)` | [`SolveOutcome::Invalid`] |
//! | panic | [`SolveOutcome::WorkerFailure`] |
//!
//! The adapter never retries: solving is deterministic, so the same input
//! always produces the same outcome.

// ============================================================================
// Submodules
// ============================================================================

/// Cubie-level cube model.
pub mod cube;

/// Move notation.
pub mod notation;

/// Bundled bounded search.
pub mod search;

// ============================================================================
// Imports
// ============================================================================

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::notation::Face;

// ============================================================================
// Re-exports
// ============================================================================

pub use cube::CubieCube;
pub use notation::{Move, format_sequence, parse_sequence};
pub use search::SearchSolver;

// ============================================================================
// SolveError
// ============================================================================

/// Rejection reported by a solver.
///
/// Every variant means "this scramble has no answer"; none of them is a
/// fault of the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    /// Input is neither a facelet string nor a move sequence.
    #[error("Malformed scramble: {message}")]
    Malformed {
        /// What was wrong with the input.
        message: String,
    },

    /// A color does not appear exactly nine times.
    #[error("Color {face:?} appears {count} times")]
    FaceletCount {
        /// The offending color.
        face: Face,
        /// How often it appeared.
        count: usize,
    },

    /// A center facelet has the wrong color.
    #[error("Center of face {face:?} has the wrong color")]
    Center {
        /// Face whose center is wrong.
        face: Face,
    },

    /// The stickers do not describe a reachable cube.
    #[error("Unsolvable cube: {message}")]
    Unsolvable {
        /// Which check failed.
        message: String,
    },

    /// No solution within the depth bound.
    #[error("No solution within {max_depth} moves")]
    DepthExceeded {
        /// The bound that was applied.
        max_depth: u8,
    },

    /// The search gave up before reaching the depth bound.
    #[error("Search budget of {nodes} nodes exhausted")]
    BudgetExhausted {
        /// Nodes expanded before giving up.
        nodes: u64,
    },
}

impl SolveError {
    /// Creates a malformed-input error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Creates an unsolvable-cube error.
    #[inline]
    pub fn unsolvable(message: impl Into<String>) -> Self {
        Self::Unsolvable {
            message: message.into(),
        }
    }
}

// ============================================================================
// Solver
// ============================================================================

/// A synchronous cube-solving routine.
///
/// Implementations must be deterministic: the same `scramble` and
/// `max_depth` always give the same answer.
pub trait Solver: Send + Sync {
    /// Solves `scramble`, searching at most `max_depth` moves deep.
    ///
    /// Returns the solution as space-separated moves (`""` when already
    /// solved).
    ///
    /// # Errors
    ///
    /// Returns [`SolveError`] when the scramble is not a valid, solvable
    /// cube description within the bound.
    fn solve(&self, scramble: &str, max_depth: u8) -> Result<String, SolveError>;
}

// ============================================================================
// SolveOutcome
// ============================================================================

/// Result of one solve, produced once and consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveOutcome {
    /// A solution was found.
    Solved {
        /// Space-separated move sequence.
        solution: String,
        /// Wall-clock solve duration.
        elapsed_seconds: f64,
    },

    /// The scramble was rejected.
    Invalid {
        /// Solver's reason, for logs only.
        reason: String,
    },

    /// Solving failed for reasons unrelated to the input.
    WorkerFailure {
        /// Failure description, for logs only.
        reason: String,
    },
}

impl SolveOutcome {
    /// Creates a worker failure outcome.
    #[inline]
    pub fn worker_failure(reason: impl Into<String>) -> Self {
        Self::WorkerFailure {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`SolveOutcome::Solved`].
    #[inline]
    #[must_use]
    pub fn is_solved(&self) -> bool {
        matches!(self, Self::Solved { .. })
    }

    /// Returns `true` for [`SolveOutcome::Invalid`].
    #[inline]
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid { .. })
    }

    /// Returns `true` for [`SolveOutcome::WorkerFailure`].
    #[inline]
    #[must_use]
    pub fn is_worker_failure(&self) -> bool {
        matches!(self, Self::WorkerFailure { .. })
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// Runs `solver` once and classifies the result.
///
/// Panics inside the solver are caught and reported as
/// [`SolveOutcome::WorkerFailure`] when the build unwinds; with
/// `panic = "abort"` the worker process dies instead and the pool reports
/// the same outcome.
pub fn solve_timed(solver: &dyn Solver, scramble: &str, max_depth: u8) -> SolveOutcome {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| solver.solve(scramble, max_depth)));
    let elapsed_seconds = start.elapsed().as_secs_f64();

    match result {
        Ok(Ok(solution)) => SolveOutcome::Solved {
            solution,
            elapsed_seconds,
        },
        Ok(Err(e)) => SolveOutcome::Invalid {
            reason: e.to_string(),
        },
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "solver panicked".to_string());
            SolveOutcome::worker_failure(reason)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSolver(Result<&'static str, SolveError>);

    impl Solver for FixedSolver {
        fn solve(&self, _scramble: &str, _max_depth: u8) -> Result<String, SolveError> {
            self.0.clone().map(str::to_string)
        }
    }

    struct PanickingSolver;

    impl Solver for PanickingSolver {
        fn solve(&self, _scramble: &str, _max_depth: u8) -> Result<String, SolveError> {
            panic!("table corrupted")
        }
    }

    #[test]
    fn test_solved_outcome() {
        let outcome = solve_timed(&FixedSolver(Ok("R U")), "U' R'", 20);
        match outcome {
            SolveOutcome::Solved {
                solution,
                elapsed_seconds,
            } => {
                assert_eq!(solution, "R U");
                assert!(elapsed_seconds >= 0.0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_rejection_is_invalid() {
        let solver = FixedSolver(Err(SolveError::malformed("bad token")));
        let outcome = solve_timed(&solver, "xyz", 20);
        assert!(outcome.is_invalid());
    }

    #[test]
    fn test_panic_is_worker_failure() {
        let outcome = solve_timed(&PanickingSolver, "R", 20);
        assert_eq!(outcome, SolveOutcome::worker_failure("table corrupted"));
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&SolveOutcome::Invalid {
            reason: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json, r#"{"status":"invalid","reason":"x"}"#);

        let parsed: SolveOutcome = serde_json::from_str(
            r#"{"status":"solved","solution":"R","elapsed_seconds":0.5}"#,
        )
        .unwrap();
        assert!(parsed.is_solved());
    }

    #[test]
    fn test_bundled_solver_through_adapter() {
        let solver = SearchSolver::new();
        assert!(solve_timed(&solver, "invalid scramble string", 20).is_invalid());

        let first = solve_timed(&solver, "R U", 20);
        let second = solve_timed(&solver, "R U", 20);
        match (first, second) {
            (
                SolveOutcome::Solved { solution: a, .. },
                SolveOutcome::Solved { solution: b, .. },
            ) => {
                assert_eq!(a, "U' R'");
                assert_eq!(a, b);
            }
            other => panic!("unexpected outcomes: {other:?}"),
        }
    }
}

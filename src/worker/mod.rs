//! Worker pool and worker processes.
//!
//! Solving runs in separate OS processes so that a slow or crashing solve
//! can neither block the event loop nor corrupt its memory.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `pool` | [`WorkerPool`]: queue, slots, self-healing |
//! | `process` | [`WorkerProcess`]: one child process and its pipes |
//! | `runtime` | Request loop run inside the worker process |

// ============================================================================
// Submodules
// ============================================================================

/// Worker pool.
pub mod pool;

/// Worker process handle.
pub mod process;

/// Worker-process request loop.
pub mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use pool::{DEFAULT_POOL_SHUTDOWN_GRACE, SolveHandle, WorkerPool};
pub use process::WorkerProcess;

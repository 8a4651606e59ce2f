//! Wire formats.
//!
//! Two channels carry messages:
//!
//! | Channel | Direction | Format |
//! |---------|-----------|--------|
//! | WebSocket / HTTP | Client → Server | Raw scramble text |
//! | WebSocket / HTTP | Server → Client | [`Reply`] payload |
//! | Worker stdin | Pool → Worker | [`WorkerRequest`] JSON line |
//! | Worker stdout | Worker → Pool | [`WorkerReply`] JSON line |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `reply` | Client-facing reply payloads |
//! | `worker` | Pool-to-worker request and reply lines |

// ============================================================================
// Submodules
// ============================================================================

/// Client-facing reply payloads.
pub mod reply;

/// Pool-to-worker messages.
pub mod worker;

// ============================================================================
// Re-exports
// ============================================================================

pub use reply::{ErrorKind, INVALID_TOKEN, Reply};
pub use worker::{WorkerReply, WorkerRequest};

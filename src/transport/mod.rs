//! WebSocket transport layer.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   WebSocket    ┌─────────────┐  submit   ┌────────────┐  stdin/stdout  ┌─────────┐
//! │  Client  │◄──────────────►│   Session   │──────────►│ WorkerPool │◄──────────────►│ Workers │
//! └──────────┘  ws-host:port  └─────────────┘  outcome  └────────────┘   JSON lines   └─────────┘
//!                                   ▲
//!                             SolveServer (one task per connection)
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `server` | Listener, accept loop, session tasks |
//! | `session` | Per-connection request/reply state machine |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket server.
pub mod server;

/// Per-connection session handler.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use server::SolveServer;
pub use session::Session;

//! WebSocket connection server.
//!
//! [`SolveServer`] accepts connections and runs one [`Session`] per
//! connection as an independent task, so a slow solve on one connection
//! never delays another.
//!
//! # Shutdown
//!
//! When the stop signal fires the server stops accepting, every session
//! sees the same signal and closes, and [`SolveServer::run`] returns once
//! all sessions have finished. Callers bound that wait with a grace period
//! and drop the future to abort stragglers.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::shutdown::stopped;
use crate::worker::WorkerPool;

use super::session::Session;

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the WebSocket upgrade handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// SolveServer
// ============================================================================

/// A bound WebSocket server.
///
/// # Example
///
/// ```ignore
/// use rubiks_cube_solver::transport::SolveServer;
///
/// let server = SolveServer::bind("0.0.0.0:8080".parse()?, pool).await?;
/// let (stop_tx, stop_rx) = rubiks_cube_solver::shutdown::channel();
/// tokio::spawn(server.run(stop_rx));
/// ```
pub struct SolveServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    pool: WorkerPool,
    /// Sessions currently open.
    active: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SolveServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolveServer")
            .field("local_addr", &self.local_addr)
            .field("sessions", &self.session_count())
            .finish_non_exhaustive()
    }
}

impl SolveServer {
    /// Binds the server.
    ///
    /// Use port 0 to let the OS pick a port.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, pool: WorkerPool) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::bind(addr, e))?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "WebSocket server bound");

        Ok(Self {
            listener,
            local_addr,
            pool,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the number of open sessions.
    #[inline]
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Returns a counter that tracks open sessions after `run` consumes
    /// the server.
    #[inline]
    #[must_use]
    pub fn session_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    /// Accepts connections until `shutdown_rx` fires, then waits for every
    /// session to close.
    ///
    /// # Errors
    ///
    /// Currently infallible after binding; accept errors are logged and
    /// retried.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!(addr = %self.local_addr, "WebSocket server listening");
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                biased;
                () = stopped(&mut shutdown_rx) => break,

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        sessions.spawn(serve_connection(
                            stream,
                            peer,
                            self.pool.clone(),
                            shutdown_rx.clone(),
                            Arc::clone(&self.active),
                        ));
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    log_session_exit(joined);
                }
            }
        }

        drop(self.listener);
        info!(open = sessions.len(), "WebSocket server stopped accepting");

        while let Some(joined) = sessions.join_next().await {
            log_session_exit(joined);
        }

        info!("WebSocket server stopped");
        Ok(())
    }
}

/// Upgrades one connection and runs its session.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pool: WorkerPool,
    shutdown_rx: watch::Receiver<bool>,
    active: Arc<AtomicUsize>,
) {
    debug!(%peer, "TCP connection accepted");

    let ws_stream = match timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::accept_async(stream)).await
    {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(%peer, error = %e, "WebSocket upgrade failed");
            return;
        }
        Err(_) => {
            debug!(%peer, "WebSocket upgrade timed out");
            return;
        }
    };

    active.fetch_add(1, Ordering::AcqRel);
    Session::new(ws_stream, peer, pool, shutdown_rx).run().await;
    active.fetch_sub(1, Ordering::AcqRel);
}

fn log_session_exit(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined
        && e.is_panic()
    {
        error!(error = %e, "Session task panicked");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    use crate::config::{PoolConfig, WorkerCommand};
    use crate::shutdown;

    /// Replies `invalid` to every request, echoing its id.
    const ECHO_INVALID: &str = r#"while IFS= read -r line; do id=$(echo "$line" | sed 's/^{"id":\([0-9]*\).*/\1/'); printf '{"id":%s,"outcome":{"status":"invalid","reason":"scripted"}}\n' "$id"; done"#;

    fn localhost() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)
    }

    fn pool() -> WorkerPool {
        let command = WorkerCommand::new("/bin/sh").arg("-c").arg(ECHO_INVALID);
        WorkerPool::start(PoolConfig::new(command).with_worker_count(1)).expect("pool starts")
    }

    #[tokio::test]
    async fn test_bind_random_port() {
        let pool = pool();
        let server = SolveServer::bind(localhost(), pool.clone())
            .await
            .expect("bind should succeed");

        assert!(server.local_addr().port() > 0);
        assert_eq!(server.session_count(), 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let pool = pool();
        let first = SolveServer::bind(localhost(), pool.clone()).await.unwrap();
        let err = SolveServer::bind(first.local_addr(), pool.clone())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Bind { .. }));
        assert!(err.is_fatal());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_round_trip_and_shutdown() {
        let pool = pool();
        let server = SolveServer::bind(localhost(), pool.clone()).await.unwrap();
        let url = format!("ws://{}", server.local_addr());
        let counter = server.session_counter();

        let (stop_tx, stop_rx) = shutdown::channel();
        let running = tokio::spawn(server.run(stop_rx));

        let (mut client, _) = connect_async(url.as_str()).await.expect("connect");
        client
            .send(Message::Text("garbage".into()))
            .await
            .unwrap();
        let reply = client.next().await.unwrap().unwrap();
        assert_eq!(reply.to_text().unwrap(), "invalid");
        assert_eq!(counter.load(Ordering::Acquire), 1);

        stop_tx.send_replace(true);
        timeout(Duration::from_secs(5), running)
            .await
            .expect("server stops")
            .unwrap()
            .unwrap();

        // The session closed the connection.
        let closing = timeout(Duration::from_secs(5), client.next()).await.unwrap();
        assert!(matches!(closing, Some(Ok(Message::Close(_))) | None | Some(Err(_))));

        pool.shutdown().await;
    }
}

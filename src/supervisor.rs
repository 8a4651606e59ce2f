//! Process supervisor.
//!
//! Starts the worker pool, binds both listeners and runs each server as a
//! supervised task sharing one stop signal. Shutdown is ordered: servers
//! first (so no new work arrives), then the pool.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::result::Result as StdResult;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, timeout_at};
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::http::HttpServer;
use crate::shutdown::{self, termination_signal};
use crate::transport::SolveServer;
use crate::worker::WorkerPool;

// ============================================================================
// Supervisor
// ============================================================================

/// Entry point for running the whole service.
#[derive(Debug)]
pub struct Supervisor;

impl Supervisor {
    /// Starts the pool and both servers.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`](crate::Error::Config) if the configuration is invalid
    /// - [`Error::WorkerSpawn`](crate::Error::WorkerSpawn) if workers cannot start
    /// - [`Error::Bind`](crate::Error::Bind) if a listener cannot be bound
    pub async fn start(config: ServerConfig) -> Result<RunningServices> {
        config.validate()?;

        let pool = WorkerPool::start(config.pool.clone())?;

        let bound = async {
            let ws = SolveServer::bind(config.ws_addr, pool.clone()).await?;
            let http = HttpServer::bind(config.http_addr, pool.clone(), &config.static_root).await?;
            Ok::<_, crate::Error>((ws, http))
        }
        .await;

        let (ws, http) = match bound {
            Ok(servers) => servers,
            Err(e) => {
                pool.shutdown_with_grace(config.shutdown_grace).await;
                return Err(e);
            }
        };

        let ws_addr = ws.local_addr();
        let http_addr = http.local_addr();
        let (stop_tx, stop_rx) = shutdown::channel();

        let ws_task = tokio::spawn(ws.run(stop_rx.clone()));
        let http_task = tokio::spawn(http.run(stop_rx));

        info!(%ws_addr, %http_addr, workers = pool.worker_count(), "Service started");

        Ok(RunningServices {
            pool,
            ws_addr,
            http_addr,
            stop_tx,
            ws_task: Some(ws_task),
            http_task: Some(http_task),
            grace: config.shutdown_grace,
        })
    }
}

// ============================================================================
// RunningServices
// ============================================================================

/// Handle to the running service.
#[derive(Debug)]
pub struct RunningServices {
    pool: WorkerPool,
    ws_addr: SocketAddr,
    http_addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    /// `None` once joined.
    ws_task: Option<JoinHandle<Result<()>>>,
    http_task: Option<JoinHandle<Result<()>>>,
    grace: Duration,
}

impl RunningServices {
    /// Bound WebSocket address.
    #[inline]
    #[must_use]
    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Bound HTTP address.
    #[inline]
    #[must_use]
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// The shared worker pool.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Runs until a termination signal arrives or a server exits on its
    /// own, then shuts everything down.
    ///
    /// # Errors
    ///
    /// Returns the reason a server stopped if it did so before a signal.
    pub async fn wait_for_signal(mut self) -> Result<()> {
        let exited = tokio::select! {
            () = termination_signal() => None,
            result = join_server(&mut self.ws_task) => Some(("websocket", result)),
            result = join_server(&mut self.http_task) => Some(("http", result)),
        };

        let outcome = match exited {
            None => Ok(()),
            Some((server, result)) => {
                let err = unexpected_exit(server, result);
                error!(server, error = %err, "Server exited unexpectedly");
                Err(err)
            }
        };

        self.shutdown().await;
        outcome
    }

    /// Stops both servers and the pool within the grace period.
    ///
    /// Servers that have not finished by the deadline are aborted; the pool
    /// then kills every worker process.
    pub async fn shutdown(self) {
        let grace_ms = u64::try_from(self.grace.as_millis()).unwrap_or(u64::MAX);
        info!(grace_ms, "Shutting down");
        self.stop_tx.send_replace(true);

        let deadline = Instant::now() + self.grace;
        for (name, task) in [("websocket", self.ws_task), ("http", self.http_task)] {
            let Some(mut task) = task else { continue };
            match timeout_at(deadline, &mut task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!(server = name, error = %e, "Server stopped with error"),
                Ok(Err(e)) => {
                    if !e.is_cancelled() {
                        warn!(server = name, error = %e, "Server task failed");
                    }
                }
                Err(_) => {
                    warn!(server = name, "Server did not stop in time, aborting");
                    task.abort();
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.pool.shutdown_with_grace(remaining).await;

        info!("Shutdown complete");
    }
}

/// Joins a server task, or never resolves if it was already joined.
async fn join_server(task: &mut Option<JoinHandle<Result<()>>>) -> StdResult<Result<()>, JoinError> {
    match task.as_mut() {
        Some(handle) => {
            let result = handle.await;
            *task = None;
            result
        }
        None => std::future::pending().await,
    }
}

/// Turns a server task that ended early into the error it reports.
fn unexpected_exit(server: &'static str, result: StdResult<Result<()>, JoinError>) -> Error {
    match result {
        Ok(Err(e)) => e,
        Ok(Ok(())) => Error::server_exited(server, "stopped without a shutdown request"),
        Err(e) => Error::server_exited(server, e.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};

    use tokio::time::timeout;

    use crate::config::{PoolConfig, WorkerCommand};

    fn config() -> ServerConfig {
        let any_port = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let mut config = ServerConfig::new(
            PoolConfig::new(WorkerCommand::new("/bin/sh").arg("-c").arg("cat > /dev/null"))
                .with_worker_count(2),
        );
        config.ws_addr = any_port;
        config.http_addr = any_port;
        config.static_root = std::env::temp_dir();
        config.shutdown_grace = Duration::from_secs(2);
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let services = Supervisor::start(config()).await.unwrap();
        assert_ne!(services.ws_addr(), services.http_addr());

        let pool = services.pool().clone();
        assert_eq!(pool.worker_pids().len(), 2);

        services.shutdown().await;
        assert!(pool.is_shut_down());
        assert!(pool.worker_pids().is_empty());
    }

    #[tokio::test]
    async fn test_server_exit_is_reported() {
        let services = Supervisor::start(config()).await.unwrap();
        let pool = services.pool().clone();
        services.http_task.as_ref().unwrap().abort();

        let err = timeout(Duration::from_secs(10), services.wait_for_signal())
            .await
            .expect("returns without a signal")
            .unwrap_err();
        assert!(matches!(err, Error::ServerExited { server: "http", .. }));
        assert!(pool.is_shut_down());
    }

    #[test]
    fn test_unexpected_exit_keeps_server_error() {
        let err = unexpected_exit("websocket", Ok(Err(Error::PoolShutdown)));
        assert!(matches!(err, Error::PoolShutdown));

        let err = unexpected_exit("websocket", Ok(Ok(())));
        assert!(matches!(err, Error::ServerExited { server: "websocket", .. }));
    }

    #[tokio::test]
    async fn test_bind_failure_is_fatal() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config();
        config.ws_addr = taken.local_addr().unwrap();

        let err = Supervisor::start(config).await.unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
    }
}

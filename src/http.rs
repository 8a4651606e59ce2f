//! Static HTTP server.
//!
//! Serves the web front-end from a directory and answers
//! `GET /solve?scramble=...` through the shared [`WorkerPool`], with the
//! same payloads as the WebSocket channel.

// ============================================================================
// Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{ErrorKind, Reply};
use crate::shutdown::stopped;
use crate::worker::WorkerPool;

// ============================================================================
// Router
// ============================================================================

#[derive(Debug, Deserialize)]
struct SolveQuery {
    #[serde(default)]
    scramble: String,
}

/// Builds the HTTP routes.
pub fn router(pool: WorkerPool, static_root: &Path) -> Router {
    let assets = ServeDir::new(static_root).append_index_html_on_directories(true);

    Router::new()
        .route("/solve", get(solve))
        .fallback_service(assets)
        .layer(TraceLayer::new_for_http())
        .with_state(pool)
}

async fn solve(State(pool): State<WorkerPool>, Query(query): Query<SolveQuery>) -> Response {
    debug!(scramble = %query.scramble, "HTTP solve request");

    let reply = match pool.submit(query.scramble) {
        Ok(handle) => match handle.outcome().await {
            Ok(outcome) => Reply::from_outcome(outcome),
            Err(e) => Reply::from_error(&e),
        },
        Err(e) => Reply::from_error(&e),
    };

    let body = match reply.encode() {
        Ok(body) => body,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let (status, content_type) = match &reply {
        Reply::Solved { .. } => (StatusCode::OK, "application/json"),
        Reply::Invalid => (StatusCode::OK, "text/plain; charset=utf-8"),
        Reply::Error { kind, .. } => {
            let status = match kind {
                ErrorKind::WorkerFailure => StatusCode::INTERNAL_SERVER_ERROR,
                ErrorKind::PoolSaturated | ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            };
            (status, "application/json")
        }
    };

    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

// ============================================================================
// HttpServer
// ============================================================================

/// A bound static HTTP server.
#[derive(Debug)]
pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    router: Router,
    static_root: PathBuf,
}

impl HttpServer {
    /// Binds the server.
    ///
    /// A missing asset directory is logged but not fatal; `/solve` still
    /// works.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bind`] if the address cannot be bound.
    pub async fn bind(addr: SocketAddr, pool: WorkerPool, static_root: &Path) -> Result<Self> {
        if !static_root.is_dir() {
            warn!(root = %static_root.display(), "Static asset directory not found");
        }

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::bind(addr, e))?;
        let local_addr = listener.local_addr()?;

        debug!(%local_addr, "HTTP server bound");

        Ok(Self {
            listener,
            local_addr,
            router: router(pool, static_root),
            static_root: static_root.to_path_buf(),
        })
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until `shutdown_rx` fires and open requests finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the server fails.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        info!(
            addr = %self.local_addr,
            root = %self.static_root.display(),
            "HTTP server listening"
        );

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move { stopped(&mut shutdown_rx).await })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use crate::config::{PoolConfig, WorkerCommand};
    use crate::shutdown;

    /// Replies `invalid` to every request, echoing its id.
    const ECHO_INVALID: &str = r#"while IFS= read -r line; do id=$(echo "$line" | sed 's/^{"id":\([0-9]*\).*/\1/'); printf '{"id":%s,"outcome":{"status":"invalid","reason":"scripted"}}\n' "$id"; done"#;

    async fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_static_files_and_solve() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("index.html"), "<h1>cube</h1>").unwrap();

        let command = WorkerCommand::new("/bin/sh").arg("-c").arg(ECHO_INVALID);
        let pool = WorkerPool::start(PoolConfig::new(command).with_worker_count(1)).unwrap();

        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let server = HttpServer::bind(addr, pool.clone(), root.path()).await.unwrap();
        let addr = server.local_addr();

        let (stop_tx, stop_rx) = shutdown::channel();
        let running = tokio::spawn(server.run(stop_rx));

        let index = get(addr, "/").await;
        assert!(index.starts_with("HTTP/1.1 200"));
        assert!(index.contains("<h1>cube</h1>"));

        let solved = get(addr, "/solve?scramble=R%20U").await;
        assert!(solved.starts_with("HTTP/1.1 200"));
        assert!(solved.ends_with("invalid"));

        let missing = get(addr, "/nope.js").await;
        assert!(missing.starts_with("HTTP/1.1 404"));

        stop_tx.send_replace(true);
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .expect("server stops")
            .unwrap()
            .unwrap();
        pool.shutdown().await;
    }
}

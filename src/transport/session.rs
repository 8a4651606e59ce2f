//! Connection session handler.
//!
//! One [`Session`] owns one WebSocket connection and walks an explicit
//! state machine:
//!
//! ```text
//! AwaitingRequest ──message──► Dispatched ──outcome──► AwaitingReply ──written──┐
//!        ▲                                                                     │
//!        └─────────────────────────────────────────────────────────────────────┘
//!
//! any state ──disconnect / transport error / shutdown──► Closed
//! ```
//!
//! At most one item is in flight per session: the next message is not read
//! until the previous reply has been written, so replies come back in
//! request order without a reorder buffer.
//!
//! While an item is in flight the session still watches for the peer going
//! away. It peeks at the next frame without consuming it: a close frame or
//! a transport error cancels the item, anything else stays buffered as the
//! next request.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;

use futures_util::stream::{Peekable, SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::identifiers::SessionId;
use crate::protocol::Reply;
use crate::shutdown::stopped;
use crate::worker::{SolveHandle, WorkerPool};

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<TcpStream>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = Peekable<SplitStream<WsStream>>;

// ============================================================================
// SessionState
// ============================================================================

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Waiting for the next inbound message.
    AwaitingRequest,
    /// An item is in the pool; waiting for its outcome.
    Dispatched,
    /// Writing the reply.
    AwaitingReply,
    /// Terminal; nothing more is read or written.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitingRequest => "awaiting_request",
            Self::Dispatched => "dispatched",
            Self::AwaitingReply => "awaiting_reply",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Result of waiting for an inbound message.
enum Inbound {
    /// A scramble to solve.
    Request(String),
    /// A binary frame that is not UTF-8.
    Undecodable,
    /// The session must close.
    Close,
}

/// Result of waiting for an outcome.
enum Resolution {
    Reply(Reply),
    Close,
}

// ============================================================================
// Session
// ============================================================================

/// Handler for one WebSocket connection.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    state: SessionState,
    pool: WorkerPool,
    writer: WsWriter,
    reader: WsReader,
    shutdown_rx: watch::Receiver<bool>,
    /// Replies written so far.
    replies: u64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over an accepted WebSocket.
    #[must_use]
    pub fn new(
        ws_stream: WsStream,
        peer: SocketAddr,
        pool: WorkerPool,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let (writer, reader) = ws_stream.split();
        Self {
            id: SessionId::next(),
            peer,
            state: SessionState::AwaitingRequest,
            pool,
            writer,
            reader: reader.peekable(),
            shutdown_rx,
            replies: 0,
        }
    }

    /// Serves the connection until it closes.
    ///
    /// Returns the number of replies written.
    pub async fn run(mut self) -> u64 {
        info!(session_id = %self.id, peer = %self.peer, "Session opened");

        while self.state != SessionState::Closed {
            self.state = self.step().await;
            debug!(session_id = %self.id, state = %self.state, "Session state");
        }

        if let Err(e) = self.writer.close().await {
            self.log_failure("Close handshake failed", &Error::transport(e));
        }

        info!(session_id = %self.id, replies = self.replies, "Session closed");
        self.replies
    }

    /// Runs one request/reply cycle and returns the next state.
    async fn step(&mut self) -> SessionState {
        let scramble = match self.next_request().await {
            Inbound::Request(text) => text,
            Inbound::Undecodable => {
                self.state = SessionState::AwaitingReply;
                return self.send(&Reply::Invalid).await;
            }
            Inbound::Close => return SessionState::Closed,
        };

        self.state = SessionState::Dispatched;
        let reply = match self.pool.submit(scramble) {
            Ok(handle) => match self.await_outcome(handle).await {
                Resolution::Reply(reply) => reply,
                Resolution::Close => return SessionState::Closed,
            },
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Submission rejected");
                Reply::from_error(&e)
            }
        };

        self.state = SessionState::AwaitingReply;
        self.send(&reply).await
    }

    /// Waits in `AwaitingRequest` for the next text message.
    async fn next_request(&mut self) -> Inbound {
        loop {
            let message = tokio::select! {
                biased;
                () = stopped(&mut self.shutdown_rx) => {
                    debug!(session_id = %self.id, "Shutdown while idle");
                    return Inbound::Close;
                }
                message = self.reader.next() => message,
            };

            match message {
                Some(Ok(Message::Text(text))) => return Inbound::Request(text.as_str().to_owned()),
                Some(Ok(Message::Binary(bytes))) => {
                    return match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => Inbound::Request(text),
                        Err(_) => Inbound::Undecodable,
                    };
                }
                Some(Ok(Message::Close(_))) => {
                    debug!(session_id = %self.id, "Closed by peer");
                    return Inbound::Close;
                }
                Some(Err(e)) => {
                    self.log_failure("Read failed", &Error::transport(e));
                    return Inbound::Close;
                }
                None => return Inbound::Close,
                // Ping, Pong and raw frames
                Some(Ok(_)) => {}
            }
        }
    }

    /// Waits in `Dispatched` for the item's outcome.
    async fn await_outcome(&mut self, handle: SolveHandle) -> Resolution {
        let job_id = handle.job_id();
        debug!(session_id = %self.id, %job_id, "Awaiting outcome");

        let result = tokio::select! {
            biased;
            () = stopped(&mut self.shutdown_rx) => {
                debug!(session_id = %self.id, %job_id, "Shutdown while dispatched");
                Err(Error::Cancelled)
            }
            () = peer_gone(&mut self.reader) => {
                debug!(session_id = %self.id, %job_id, "Peer left, discarding item");
                return Resolution::Close;
            }
            result = handle.outcome() => result,
        };

        match result {
            Ok(outcome) => Resolution::Reply(Reply::from_outcome(outcome)),
            Err(e) => {
                // Tell the client why before closing.
                let _ = self.send(&Reply::from_error(&e)).await;
                Resolution::Close
            }
        }
    }

    /// Writes a reply and returns the next state.
    async fn send(&mut self, reply: &Reply) -> SessionState {
        let written = match reply.encode() {
            Ok(text) => self
                .writer
                .send(Message::Text(text.into()))
                .await
                .map_err(Error::transport),
            Err(e) => Err(e),
        };

        match written {
            Ok(()) => {
                self.replies += 1;
                SessionState::AwaitingRequest
            }
            Err(e) => {
                self.log_failure("Cannot write reply", &e);
                SessionState::Closed
            }
        }
    }

    /// Peer disconnects are routine; anything else is worth a warning.
    fn log_failure(&self, context: &str, err: &Error) {
        if err.is_connection_error() {
            debug!(session_id = %self.id, error = %err, "{context}");
        } else {
            warn!(session_id = %self.id, error = %err, "{context}");
        }
    }
}

/// Resolves when the next frame shows the peer has gone.
///
/// Data frames are left in place for the next `AwaitingRequest`.
async fn peer_gone(reader: &mut WsReader) {
    let gone = match Pin::new(reader).peek().await {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => true,
        Some(Ok(_)) => false,
    };

    if !gone {
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::{MaybeTlsStream, accept_async, connect_async};

    use crate::config::{PoolConfig, WorkerCommand};
    use crate::protocol::ErrorKind;
    use crate::shutdown;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Takes requests and never answers.
    const STALL: &str = "while read -r line; do sleep 30; done";

    const WAIT: Duration = Duration::from_secs(5);

    fn pool(script: &str) -> WorkerPool {
        let command = WorkerCommand::new("/bin/sh").arg("-c").arg(script);
        WorkerPool::start(PoolConfig::new(command).with_worker_count(1)).expect("pool starts")
    }

    /// Runs a single session and connects a client to it.
    async fn serve_one(
        pool: &WorkerPool,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Client, JoinHandle<u64>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let pool = pool.clone();

        let session = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let ws_stream = accept_async(stream).await.unwrap();
            Session::new(ws_stream, peer, pool, shutdown_rx).run().await
        });

        let (client, _) = connect_async(url.as_str()).await.unwrap();
        (client, session)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::AwaitingRequest.to_string(), "awaiting_request");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }

    #[tokio::test]
    async fn test_undecodable_binary_gets_invalid() {
        let pool = pool(STALL);
        let (_stop_tx, stop_rx) = shutdown::channel();
        let (mut client, session) = serve_one(&pool, stop_rx).await;

        // The worker never answers, so this reply can only come from the session.
        client
            .send(Message::Binary(vec![0xff, 0xfe].into()))
            .await
            .unwrap();
        let reply = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        assert_eq!(reply.to_text().unwrap(), "invalid");

        client.close(None).await.unwrap();
        assert_eq!(timeout(WAIT, session).await.unwrap().unwrap(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_close_while_dispatched_ends_session() {
        let pool = pool(STALL);
        let (_stop_tx, stop_rx) = shutdown::channel();
        let (mut client, session) = serve_one(&pool, stop_rx).await;

        client.send(Message::Text("R".into())).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        client.close(None).await.unwrap();

        let replies = timeout(WAIT, session)
            .await
            .expect("session ends while the worker is still busy")
            .unwrap();
        assert_eq!(replies, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_while_dispatched_sends_unavailable() {
        let pool = pool(STALL);
        let (stop_tx, stop_rx) = shutdown::channel();
        let (mut client, session) = serve_one(&pool, stop_rx).await;

        client.send(Message::Text("R".into())).await.unwrap();
        sleep(Duration::from_millis(100)).await;
        stop_tx.send_replace(true);

        let message = timeout(WAIT, client.next()).await.unwrap().unwrap().unwrap();
        let reply = Reply::decode(message.to_text().unwrap()).unwrap();
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::Unavailable,
                ..
            }
        ));
        assert_eq!(timeout(WAIT, session).await.unwrap().unwrap(), 1);
        pool.shutdown().await;
    }
}

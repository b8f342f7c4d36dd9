//! Persistent duplex connection and receive loop.
//!
//! This module owns one WebSocket connection to a Meridian server,
//! including request/reply correlation and push-event routing.
//!
//! # Receive Loop
//!
//! Each connection spawns a dedicated tokio task that handles:
//!
//! - Incoming frames from the server (replies, push events)
//! - Outgoing requests from the client API
//! - Request/reply correlation by UUID
//! - Push-event handler callbacks
//!
//! Inbound frames flow one way into the loop and leave through either
//! the [`Correlator`] (reply path) or the [`SubscriptionRegistry`]
//! (push path). A frame that fails to decode is dropped with a
//! diagnostic; it never terminates the loop.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::to_string;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, trace, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::protocol::{Reply, RpcRequest, ServerMessage};
use crate::transport::correlator::Correlator;
use crate::transport::subscriptions::SubscriptionRegistry;

// ============================================================================
// Constants
// ============================================================================

/// Maximum outstanding requests per connection before rejecting new ones.
const MAX_PENDING_REQUESTS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// WebSocket stream over a plain or TLS TCP connection.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Transport handshake in progress.
    Connecting = 0,
    /// Handshake complete; requests may be sent.
    Open = 1,
    /// Closed locally or by the remote side; unusable.
    Closed = 2,
}

/// Atomic cell holding a [`ConnectionState`].
#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn load(&self) -> ConnectionState {
        match self.0.load(Ordering::SeqCst) {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            _ => ConnectionState::Closed,
        }
    }
}

// ============================================================================
// ConnectionCommand
// ============================================================================

/// Internal commands for the receive loop.
enum ConnectionCommand {
    /// Serialize and transmit a request frame.
    Transmit {
        /// The request to put on the wire.
        request: RpcRequest,
    },
    /// Close the transport and terminate the loop.
    Shutdown,
}

// ============================================================================
// Connection
// ============================================================================

/// One persistent duplex connection to a Meridian server.
///
/// Owns the transport handle and the receive-loop task. Cloning shares
/// the same underlying connection.
///
/// # Thread Safety
///
/// `Connection` is `Send + Sync`; all operations may be called
/// concurrently from any task.
#[derive(Debug)]
pub(crate) struct Connection {
    /// Channel for sending commands to the receive loop.
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    /// Outstanding request slots (shared with the receive loop).
    correlator: Arc<Correlator>,
    /// Live subscription handlers (shared with the receive loop).
    subscriptions: Arc<SubscriptionRegistry>,
    /// Lifecycle state (shared with the receive loop).
    state: Arc<StateCell>,
}

impl Clone for Connection {
    fn clone(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            correlator: Arc::clone(&self.correlator),
            subscriptions: Arc::clone(&self.subscriptions),
            state: Arc::clone(&self.state),
        }
    }
}

impl Connection {
    /// Opens a connection to the configured endpoint.
    ///
    /// Performs the WebSocket handshake bounded by the configured
    /// connect timeout, then spawns the receive-loop task. Either a
    /// fully usable `Open` connection is returned, or an error; nothing
    /// in between.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is not a valid `ws`/`wss` URL
    /// - [`Error::ConnectFailed`] if the handshake times out or is
    ///   refused
    pub(crate) async fn open(config: &Config) -> Result<Self> {
        let url = Self::endpoint_url(&config.endpoint)?;
        let state = Arc::new(StateCell::new(ConnectionState::Connecting));

        let (ws_stream, _response) = timeout(config.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::connect_failed(format!(
                    "handshake timed out after {}ms",
                    config.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::connect_failed(e.to_string()))?;

        debug!(endpoint = %url, "transport handshake complete");
        state.store(ConnectionState::Open);

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let correlator = Arc::new(Correlator::new());
        let subscriptions = Arc::new(SubscriptionRegistry::new());

        tokio::spawn(Self::run_receive_loop(
            ws_stream,
            command_rx,
            Arc::clone(&correlator),
            Arc::clone(&subscriptions),
            Arc::clone(&state),
        ));

        Ok(Self {
            command_tx,
            correlator,
            subscriptions,
            state,
        })
    }

    /// Validates the configured endpoint and parses it into a URL.
    fn endpoint_url(endpoint: &str) -> Result<Url> {
        let url = Url::parse(endpoint.trim())
            .map_err(|e| Error::config(format!("invalid endpoint '{endpoint}': {e}")))?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::config(format!(
                    "endpoint must use ws:// or wss:// (found '{other}')"
                )));
            }
        }

        if url.host_str().is_none() {
            return Err(Error::config("endpoint must include a host"));
        }

        Ok(url)
    }

    /// Sends a request and waits for its reply.
    ///
    /// The correlation slot is reserved strictly before the frame is
    /// handed to the receive loop for transmission, so the reply cannot
    /// race the reservation.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the connection closes first
    /// - [`Error::RequestTimeout`] if no reply arrives within
    ///   `request_timeout`
    /// - [`Error::Protocol`] if too many requests are outstanding
    pub(crate) async fn send(
        &self,
        request: RpcRequest,
        request_timeout: Duration,
    ) -> Result<Reply> {
        let request_id = request.id;

        let pending = self.correlator.pending();
        if pending >= MAX_PENDING_REQUESTS {
            warn!(pending, max = MAX_PENDING_REQUESTS, "too many pending requests");
            return Err(Error::protocol(format!(
                "too many pending requests: {pending}/{MAX_PENDING_REQUESTS}"
            )));
        }

        let reply_rx = self.correlator.register(request_id);

        if self
            .command_tx
            .send(ConnectionCommand::Transmit { request })
            .is_err()
        {
            self.correlator.discard(request_id);
            return Err(Error::ConnectionClosed);
        }

        match timeout(request_timeout, reply_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                // Timeout is local to this call; only our slot goes away.
                self.correlator.discard(request_id);
                Err(Error::request_timeout(
                    request_id,
                    request_timeout.as_millis() as u64,
                ))
            }
        }
    }

    /// Returns the live subscription registry for this connection.
    pub(crate) fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    /// Returns the number of outstanding requests.
    #[must_use]
    pub(crate) fn pending_requests(&self) -> usize {
        self.correlator.pending()
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub(crate) fn state(&self) -> ConnectionState {
        self.state.load()
    }

    /// Returns `true` once the connection has closed.
    #[must_use]
    pub(crate) fn is_closed(&self) -> bool {
        self.state.load() == ConnectionState::Closed
    }

    /// Requests a graceful shutdown of the transport.
    ///
    /// Idempotent and safe from any task; once the loop observes the
    /// command it closes the socket, fails every waiter with
    /// [`Error::ConnectionClosed`], and clears the subscriptions.
    pub(crate) fn shutdown(&self) {
        let _ = self.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Receive loop that owns the WebSocket I/O for one connection.
    async fn run_receive_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
        correlator: Arc<Correlator>,
        subscriptions: Arc<SubscriptionRegistry>,
        state: Arc<StateCell>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_frame(text.as_str(), &correlator, &subscriptions);
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("connection closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "transport error");
                            break;
                        }

                        None => {
                            debug!("transport stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the client API
                command = command_rx.recv() => {
                    match command {
                        Some(ConnectionCommand::Transmit { request }) => {
                            Self::handle_transmit(request, &mut ws_write, &correlator).await;
                        }

                        Some(ConnectionCommand::Shutdown) => {
                            debug!("shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!("command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Whatever ended the loop, nobody stays blocked and no stale
        // handler outlives the connection.
        state.store(ConnectionState::Closed);
        correlator.fail_all();
        subscriptions.clear();

        debug!("receive loop terminated");
    }

    /// Decodes an inbound frame and routes it to the reply or push path.
    fn handle_frame(text: &str, correlator: &Correlator, subscriptions: &SubscriptionRegistry) {
        match ServerMessage::decode(text) {
            Ok(ServerMessage::Reply(reply)) => {
                correlator.deliver(reply.id, Ok(reply));
            }

            Ok(ServerMessage::Notification { result }) => {
                subscriptions.dispatch(result);
            }

            // Fatal to this frame only; the loop keeps reading.
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
            }
        }
    }

    /// Serializes a request and puts it on the wire.
    ///
    /// Failures are delivered into the request's correlation slot so the
    /// waiting caller observes them instead of timing out.
    async fn handle_transmit(
        request: RpcRequest,
        ws_write: &mut SplitSink<WsStream, Message>,
        correlator: &Correlator,
    ) {
        let request_id = request.id;

        let json = match to_string(&request) {
            Ok(j) => j,
            Err(e) => {
                correlator.deliver(request_id, Err(Error::Json(e)));
                return;
            }
        };

        if let Err(e) = ws_write.send(Message::Text(json.into())).await {
            correlator.deliver(request_id, Err(Error::WebSocket(e)));
            return;
        }

        trace!(%request_id, "request transmitted");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::testserver::TestServer;

    fn test_config(endpoint: String) -> Config {
        Config::new(endpoint).with_request_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_endpoint_url_accepts_ws_schemes() {
        assert!(Connection::endpoint_url("ws://localhost:8000/rpc").is_ok());
        assert!(Connection::endpoint_url("wss://db.example.com/rpc").is_ok());
    }

    #[test]
    fn test_endpoint_url_rejects_other_schemes() {
        let err = Connection::endpoint_url("http://localhost:8000").expect_err("scheme");
        assert!(matches!(err, Error::Config { .. }));

        let err = Connection::endpoint_url("not a url").expect_err("parse");
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_open_against_refused_port() {
        // Nothing listens on this port; the handshake must be refused.
        let config = Config::new("ws://127.0.0.1:1/rpc");
        let err = Connection::open(&config).await.expect_err("refused");
        assert!(matches!(err, Error::ConnectFailed { .. }));
    }

    #[tokio::test]
    async fn test_send_receives_matching_reply() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        let request = RpcRequest::new("echo", vec![json!(42)]);
        let reply = connection
            .send(request, Duration::from_secs(2))
            .await
            .expect("reply");

        assert_eq!(reply.into_result().expect("success"), json!(42));
        assert_eq!(connection.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_callers() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        // The slow request is issued first but replied to last.
        let slow = connection.send(
            RpcRequest::new("echo_after", vec![json!("slow"), json!(150)]),
            Duration::from_secs(2),
        );
        let fast = connection.send(
            RpcRequest::new("echo_after", vec![json!("fast"), json!(10)]),
            Duration::from_secs(2),
        );

        let (slow_reply, fast_reply) = tokio::join!(slow, fast);

        assert_eq!(
            slow_reply.expect("slow").into_result().expect("success"),
            json!("slow")
        );
        assert_eq!(
            fast_reply.expect("fast").into_result().expect("success"),
            json!("fast")
        );
    }

    #[tokio::test]
    async fn test_request_timeout_leaves_connection_usable() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        // The server never replies to "block".
        let err = connection
            .send(RpcRequest::new("block", vec![]), Duration::from_millis(100))
            .await
            .expect_err("timeout");
        assert!(err.is_timeout());
        assert_eq!(connection.pending_requests(), 0);

        // Only that call failed; the connection still works.
        let reply = connection
            .send(
                RpcRequest::new("echo", vec![json!("still alive")]),
                Duration::from_secs(2),
            )
            .await
            .expect("reply");
        assert_eq!(
            reply.into_result().expect("success"),
            json!("still alive")
        );
    }

    #[tokio::test]
    async fn test_shutdown_releases_all_blocked_callers() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let connection = connection.clone();
                tokio::spawn(async move {
                    connection
                        .send(RpcRequest::new("block", vec![]), Duration::from_secs(30))
                        .await
                })
            })
            .collect();

        // Let the requests reach the server before closing.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(connection.pending_requests(), 4);

        connection.shutdown();

        for waiter in waiters {
            let outcome = waiter.await.expect("task");
            assert!(matches!(outcome, Err(Error::ConnectionClosed)));
        }

        assert!(connection.is_closed());
        assert_eq!(connection.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_undecodable_frame_does_not_kill_the_loop() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        // "garbage" makes the server emit an undecodable frame before
        // replying; the loop must drop it and keep going.
        let reply = connection
            .send(RpcRequest::new("garbage", vec![]), Duration::from_secs(2))
            .await
            .expect("reply");
        assert!(reply.is_success());

        let reply = connection
            .send(RpcRequest::new("echo", vec![json!(1)]), Duration::from_secs(2))
            .await
            .expect("reply");
        assert_eq!(reply.into_result().expect("success"), json!(1));
    }

    #[tokio::test]
    async fn test_push_for_unknown_subscription_is_dropped() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        // Trigger a push for an id nobody registered.
        let reply = connection
            .send(
                RpcRequest::new("notify", vec![json!("nobody-home"), json!({"n": 1})]),
                Duration::from_secs(2),
            )
            .await
            .expect("reply");
        assert!(reply.is_success());

        // The loop survived and the connection still answers.
        let reply = connection
            .send(RpcRequest::new("echo", vec![json!(2)]), Duration::from_secs(2))
            .await
            .expect("reply");
        assert_eq!(reply.into_result().expect("success"), json!(2));
    }

    #[tokio::test]
    async fn test_remote_close_fails_waiters_and_marks_closed() {
        let server = TestServer::spawn().await;
        let connection = Connection::open(&test_config(server.endpoint()))
            .await
            .expect("open");

        let blocked = {
            let connection = connection.clone();
            tokio::spawn(async move {
                connection
                    .send(RpcRequest::new("block", vec![]), Duration::from_secs(30))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // "hangup" makes the server close the socket from its side.
        let _ = connection
            .send(RpcRequest::new("hangup", vec![]), Duration::from_secs(2))
            .await;

        let outcome = blocked.await.expect("task");
        assert!(matches!(outcome, Err(Error::ConnectionClosed)));

        // Wait for the loop to finish its close handling.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(connection.is_closed());
    }
}

//! Client facade for the streaming transport.
//!
//! [`Client`] is the only type callers touch directly for per-connection
//! work: it generates request ids, pairs every request with its reply,
//! registers live subscription handlers, and exposes connect/close
//! lifecycle. One connection serves any number of concurrent callers;
//! cloning a client shares the underlying connection.
//!
//! # Example
//!
//! ```ignore
//! use meridian_client::{Client, Config, Credentials};
//!
//! let config = Config::new("ws://127.0.0.1:8000/rpc")
//!     .with_credentials(Credentials::new("root", "root"))
//!     .with_namespace("app", "main");
//!
//! let client = Client::connect(&config).await?;
//! let rows = client.query("SELECT * FROM sensor").await?;
//! client.close();
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;
use crate::protocol::{Notification, RpcRequest};
use crate::transport::Connection;
use crate::transport::connection::ConnectionState;

// ============================================================================
// Client
// ============================================================================

/// A connection-scoped handle to a Meridian server.
///
/// # Thread Safety
///
/// `Client` is `Send + Sync` and cheap to clone; clones share one
/// connection and may issue requests concurrently. Replies are matched
/// to callers by request id, never by arrival order.
#[derive(Debug)]
pub struct Client {
    /// The underlying duplex connection.
    connection: Connection,
    /// Timeout applied to each request/reply exchange.
    request_timeout: Duration,
    /// Set once `close()` has been called on any clone.
    shutdown_requested: Arc<AtomicBool>,
}

impl Clone for Client {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            request_timeout: self.request_timeout,
            shutdown_requested: Arc::clone(&self.shutdown_requested),
        }
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Connects to the configured endpoint.
    ///
    /// Performs the transport handshake and, when the configuration
    /// carries credentials or a namespace selection, the implicit
    /// `signin` / `use` exchange. Construction is atomic: on any
    /// failure the connection is torn down and an error returned;
    /// callers never observe a half-initialized client.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is invalid
    /// - [`Error::ConnectFailed`] if the handshake or the implicit
    ///   exchange fails or times out
    pub async fn connect(config: &Config) -> Result<Self> {
        let connection = Connection::open(config).await?;
        let client = Self {
            connection,
            request_timeout: config.request_timeout,
            shutdown_requested: Arc::new(AtomicBool::new(false)),
        };

        if let Err(e) = client.handshake(config).await {
            client.connection.shutdown();
            return Err(Error::connect_failed(e.to_string()));
        }

        debug!(endpoint = %config.endpoint, "client connected");
        Ok(client)
    }

    /// Runs the implicit sign-in and namespace selection.
    async fn handshake(&self, config: &Config) -> Result<()> {
        if let Some(credentials) = &config.credentials {
            self.signin(credentials).await?;
        }

        if let (Some(namespace), Some(database)) = (&config.namespace, &config.database) {
            self.use_ns(namespace, database).await?;
        }

        Ok(())
    }

    /// Closes the client.
    ///
    /// Idempotent and safe from any task. The transport shuts down in
    /// the background: every caller still waiting on a reply fails with
    /// [`Error::ConnectionClosed`] and all subscriptions are cleared.
    /// Subsequent calls on this client fail with
    /// [`Error::ClientClosed`].
    pub fn close(&self) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        debug!("client close requested");
        self.connection.shutdown();
    }

    /// Fails fast when the client can no longer carry requests.
    fn guard(&self) -> Result<()> {
        if self.shutdown_requested.load(Ordering::SeqCst) {
            return Err(Error::ClientClosed);
        }
        if self.connection.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

// ============================================================================
// Client - Requests
// ============================================================================

impl Client {
    /// Invokes `method` with `params` and returns the reply's result.
    ///
    /// This is the generic boundary the query-builder layer sits on:
    /// method and parameters pass through uninspected. A fresh request
    /// id is generated per call and its slot is reserved before the
    /// frame is transmitted.
    ///
    /// # Errors
    ///
    /// - [`Error::ClientClosed`] after `close()`
    /// - [`Error::ConnectionClosed`] if the connection went away
    /// - [`Error::RequestTimeout`] if no reply arrives in time
    /// - [`Error::Server`] if the server replies with an error
    pub async fn send(&self, method: impl Into<String>, params: Vec<Value>) -> Result<Value> {
        self.guard()?;

        let request = RpcRequest::new(method, params);
        let reply = self.connection.send(request, self.request_timeout).await?;
        reply.into_result()
    }

    /// Checks connection liveness with a `ping` exchange.
    pub async fn ping(&self) -> Result<()> {
        self.send("ping", vec![]).await.map(|_| ())
    }

    /// Runs a query string and returns its result rows.
    pub async fn query(&self, statement: impl Into<String>) -> Result<Value> {
        self.send("query", vec![Value::String(statement.into())])
            .await
    }

    /// Signs in with the given credentials.
    pub async fn signin(&self, credentials: &Credentials) -> Result<Value> {
        self.send(
            "signin",
            vec![json!({
                "user": credentials.username,
                "pass": credentials.password,
            })],
        )
        .await
    }

    /// Selects the namespace and database for this connection.
    pub async fn use_ns(&self, namespace: &str, database: &str) -> Result<()> {
        self.send("use", vec![json!(namespace), json!(database)])
            .await
            .map(|_| ())
    }
}

// ============================================================================
// Client - Live Subscriptions
// ============================================================================

impl Client {
    /// Starts a live subscription on `target` and registers `handler`
    /// for its push events.
    ///
    /// The server assigns the subscription id in its reply; the handler
    /// is registered only when that reply is a success, so an error
    /// reply leaves no side effect. The handler runs on this
    /// connection's receive-loop task — keep it fast and non-blocking.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error, or [`Error::Protocol`] if the
    /// reply does not carry a subscription id.
    pub async fn live<F>(&self, target: &str, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(Notification) + Send + Sync + 'static,
    {
        let value = self.send("live", vec![json!(target)]).await?;

        let id = value
            .as_str()
            .map(SubscriptionId::from)
            .ok_or_else(|| {
                Error::protocol(format!("live reply did not carry a subscription id: {value}"))
            })?;

        self.connection
            .subscriptions()
            .put(id.clone(), Arc::new(handler));
        Ok(id)
    }

    /// Stops the live subscription `id`.
    ///
    /// The handler is removed only when the server confirms; an error
    /// reply leaves it registered.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error.
    pub async fn kill(&self, id: &SubscriptionId) -> Result<()> {
        self.send("kill", vec![json!(id.as_str())]).await?;
        self.connection.subscriptions().remove(id);
        Ok(())
    }
}

// ============================================================================
// Client - Introspection
// ============================================================================

impl Client {
    /// Returns the connection lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Returns `true` once the client or its connection has closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst) || self.connection.is_closed()
    }

    /// Returns the number of requests awaiting replies.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.connection.pending_requests()
    }

    /// Returns the number of active live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.connection.subscriptions().len()
    }
}

// ============================================================================
// Tests
// ============================================================================

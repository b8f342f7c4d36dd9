//! Meridian client - async Rust driver for the Meridian database.
//!
//! This library provides the streaming-transport client for a Meridian
//! server: one persistent, multiplexed WebSocket connection per
//! [`Client`], with awaitable per-call request/reply exchanges, live
//! subscription push events, and a bounded [`ConnectionPool`] for
//! running many callers over many connections.
//!
//! # Architecture
//!
//! Each connection spawns a dedicated receive loop that classifies
//! every inbound frame:
//!
//! - **Correlated reply**: carries the `id` of an outstanding request
//!   and wakes exactly the caller waiting on that id, whatever the
//!   arrival order.
//! - **Push event**: carries no top-level `id`; the subscription id
//!   nested in its payload routes it to the registered handler.
//!
//! Key design principles:
//!
//! - Request ids are UUIDs reserved strictly before transmission
//! - Wake-on-event everywhere (channels, no polling)
//! - A closing connection releases every blocked caller
//! - Callbacks run outside all internal locks
//!
//! # Quick Start
//!
//! ```no_run
//! use meridian_client::{Client, Config, Credentials, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::new("ws://127.0.0.1:8000/rpc")
//!         .with_credentials(Credentials::new("root", "root"))
//!         .with_namespace("app", "main");
//!
//!     let client = Client::connect(&config).await?;
//!
//!     let rows = client.query("SELECT * FROM sensor").await?;
//!     println!("rows: {rows}");
//!
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | Per-connection facade: [`Client`] |
//! | [`config`] | Connection configuration |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire message types |
//! | [`transport`] | Receive loop, correlation, pooling |

// ============================================================================
// Modules
// ============================================================================

/// Per-connection client facade.
///
/// Use [`Client::connect`] to establish a connection.
pub mod client;

/// Connection configuration.
///
/// Configuration is always passed in explicitly; the crate keeps no
/// process-wide state.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Wire protocol message types.
///
/// Outbound requests and classified inbound frames.
pub mod protocol;

/// Streaming transport layer.
///
/// Receive loop, request/reply correlation, subscription routing, and
/// the connection pool.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Client types
pub use client::Client;

// Configuration types
pub use config::{Config, Credentials};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{RequestId, SubscriptionId};

// Protocol types
pub use protocol::{Action, Notification, Reply, RpcRequest, ServerMessage};

// Transport types
pub use transport::{ConnectionPool, ConnectionState, LiveHandler, PoolOptions};

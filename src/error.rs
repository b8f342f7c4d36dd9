//! Error types for the Meridian client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use meridian_client::{Client, Result};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     let value = client.query("SELECT * FROM sensor").await?;
//!     println!("{value}");
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::ConnectFailed`], [`Error::ConnectionClosed`], [`Error::ClientClosed`] |
//! | Request | [`Error::RequestTimeout`], [`Error::Server`], [`Error::Protocol`] |
//! | Decoding | [`Error::MalformedFrame`], [`Error::PayloadTooComplex`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::RequestId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when client or pool configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Establishing a connection failed.
    ///
    /// The WebSocket handshake (or the implicit signin/use exchange) did
    /// not complete within the connect timeout or was refused. Fatal to
    /// that construction attempt; nothing partially usable is returned.
    #[error("Connect failed: {message}")]
    ConnectFailed {
        /// Description of the connect failure.
        message: String,
    },

    /// The connection closed while an operation was in flight.
    ///
    /// Raised to every caller blocked on a connection that has closed,
    /// locally or remotely. The connection is unusable afterward.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Operation issued after `close()`.
    ///
    /// Always reported, never retried.
    #[error("Client is closed")]
    ClientClosed,

    // ========================================================================
    // Request Errors
    // ========================================================================
    /// A request did not receive its reply within the timeout.
    ///
    /// Local to that call; the connection remains usable.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request id that timed out.
        request_id: RequestId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The server answered the request with an error reply.
    #[error("Server error {code}: {message}")]
    Server {
        /// Server-side error code.
        code: i64,
        /// Server-side error message.
        message: String,
    },

    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// An inbound frame could not be decoded as a reply or push event.
    ///
    /// Fatal to that frame only; the receive loop logs and drops it.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decode failure.
        message: String,
    },

    /// An inbound frame was too large or too deeply nested to decode.
    ///
    /// Fatal to that frame only; the receive loop logs and drops it.
    #[error("Payload too complex: {message}")]
    PayloadTooComplex {
        /// Description of the offending payload.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connect-failed error.
    #[inline]
    pub fn connect_failed(message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            message: message.into(),
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: RequestId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }

    /// Creates a server error from an error reply.
    #[inline]
    pub fn server(code: i64, message: impl Into<String>) -> Self {
        Self::Server {
            code,
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a malformed-frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a payload-too-complex error.
    #[inline]
    pub fn payload_too_complex(message: impl Into<String>) -> Self {
        Self::PayloadTooComplex {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectFailed { .. }
                | Self::ConnectionClosed
                | Self::ClientClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this is a per-frame decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame { .. } | Self::PayloadTooComplex { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry over the same connection.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. } | Self::Server { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

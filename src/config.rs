//! Client configuration.
//!
//! Provides a type-safe configuration value for connecting to a Meridian
//! server: endpoint, optional credentials, optional namespace selection,
//! and per-call timeouts. Configuration is always passed in explicitly;
//! the crate keeps no process-wide state.
//!
//! # Example
//!
//! ```ignore
//! use meridian_client::{Config, Credentials};
//!
//! let config = Config::new("ws://127.0.0.1:8000/rpc")
//!     .with_credentials(Credentials::new("root", "root"))
//!     .with_namespace("app", "main")
//!     .with_request_timeout(std::time::Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single request/reply exchange.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Credentials
// ============================================================================

/// Opaque sign-in credentials.
///
/// The client passes these through the `signin` exchange verbatim; it
/// never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password or token.
    pub password: String,
}

impl Credentials {
    /// Creates a new credentials pair.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Connection configuration for a single [`Client`](crate::Client).
///
/// Controls where to connect, what to authenticate as, which namespace
/// and database to select after connecting, and how long to wait for the
/// handshake and for each reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// WebSocket endpoint, e.g. `ws://127.0.0.1:8000/rpc`.
    pub endpoint: String,

    /// Credentials for the implicit `signin` exchange, if any.
    pub credentials: Option<Credentials>,

    /// Namespace to select after connecting, if any.
    pub namespace: Option<String>,

    /// Database to select after connecting, if any.
    pub database: Option<String>,

    /// Timeout for the connection handshake.
    pub connect_timeout: Duration,

    /// Timeout for each request/reply exchange.
    pub request_timeout: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl Config {
    /// Creates a configuration for the given endpoint with default
    /// timeouts, no credentials, and no namespace selection.
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: None,
            namespace: None,
            database: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl Config {
    /// Sets the sign-in credentials.
    #[inline]
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Sets the namespace and database to select after connecting.
    #[inline]
    #[must_use]
    pub fn with_namespace(
        mut self,
        namespace: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        self.namespace = Some(namespace.into());
        self.database = Some(database.into());
        self
    }

    /// Sets the connection handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-request reply timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("ws://localhost:8000/rpc");
        assert_eq!(config.endpoint, "ws://localhost:8000/rpc");
        assert!(config.credentials.is_none());
        assert!(config.namespace.is_none());
        assert!(config.database.is_none());
        assert_eq!(config.connect_timeout, DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_builder_methods() {
        let config = Config::new("ws://localhost:8000/rpc")
            .with_credentials(Credentials::new("root", "secret"))
            .with_namespace("app", "main")
            .with_connect_timeout(Duration::from_secs(5))
            .with_request_timeout(Duration::from_secs(10));

        assert_eq!(
            config.credentials,
            Some(Credentials::new("root", "secret"))
        );
        assert_eq!(config.namespace.as_deref(), Some("app"));
        assert_eq!(config.database.as_deref(), Some("main"));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}

//! Streaming transport layer.
//!
//! This module turns one persistent, multiplexed WebSocket connection
//! into a set of awaitable per-call operations, and pools many such
//! connections under load.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        frames in         ┌──────────────────┐
//! │   Meridian   │─────────────────────────►│   receive loop   │
//! │    server    │◄─────────────────────────│  (one per conn)  │
//! └──────────────┘        frames out        └────────┬─────────┘
//!                                          replies   │   push events
//!                                      ┌─────────────┴──────────────┐
//!                                      ▼                            ▼
//!                               ┌────────────┐            ┌──────────────────┐
//!                               │ correlator │            │  subscriptions   │
//!                               └────────────┘            └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::open` - WebSocket handshake bounded by the connect timeout
//! 2. Implicit `signin` / `use` exchange performed by the client facade
//! 3. `Connection::send` - correlated request/reply exchanges
//! 4. `Connection::shutdown` - close the transport; every waiter is released
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Duplex connection and receive loop |
//! | `correlator` | Request/reply correlation |
//! | `pool` | Bounded client pool |
//! | `subscriptions` | Live subscription routing |

// ============================================================================
// Submodules
// ============================================================================

/// Duplex connection and receive loop.
pub mod connection;

/// Request/reply correlation.
pub mod correlator;

/// Bounded client pool.
pub mod pool;

/// Live subscription routing.
pub mod subscriptions;

/// In-process mock server for transport tests.
#[cfg(test)]
pub(crate) mod testserver;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::ConnectionState;
pub use pool::{ConnectionPool, PoolOptions};
pub use subscriptions::LiveHandler;

pub(crate) use connection::Connection;

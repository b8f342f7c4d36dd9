//! Wire protocol message types.
//!
//! This module defines the message format exchanged with a Meridian
//! server over the persistent WebSocket transport.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`RpcRequest`] | Client → Server | Method invocation |
//! | [`Reply`] | Server → Client | Correlated reply (result or error) |
//! | [`Notification`] | Server → Client | Live subscription push event |
//!
//! Replies carry the top-level `id` of the request they answer. Push
//! events carry no top-level `id`; the subscription they belong to is
//! named by the `id` field nested inside their `result` payload.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Inbound frame decoding and classification |
//! | `request` | Outbound request type |

// ============================================================================
// Submodules
// ============================================================================

/// Inbound frame decoding and classification.
pub mod message;

/// Outbound request type.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use message::{Action, ErrorPayload, Notification, Reply, ServerMessage, MAX_FRAME_BYTES};
pub use request::RpcRequest;

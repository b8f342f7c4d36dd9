//! Inbound frame decoding and classification.
//!
//! Every text frame received from the server decodes into exactly one
//! [`ServerMessage`]: a correlated [`Reply`] when the frame carries a
//! top-level `id`, or a [`Notification`] when the subscription id is
//! nested inside the `result` payload. Classification happens at decode
//! time; downstream code never inspects raw JSON shapes.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::result::Result as StdResult;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{RequestId, SubscriptionId};

// ============================================================================
// Constants
// ============================================================================

/// Maximum accepted size of a single inbound frame.
///
/// Larger frames are rejected before JSON parsing; deeper-than-sane
/// nesting is caught by the parser's recursion limit. Either way the
/// frame is dropped without terminating the receive loop.
pub const MAX_FRAME_BYTES: usize = 16 << 20; // 16 MiB

// ============================================================================
// ServerMessage
// ============================================================================

/// A decoded inbound frame.
///
/// Replies answer a specific outstanding request; notifications are
/// unsolicited push events for a live subscription.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// A correlated reply to an outstanding request.
    Reply(Reply),

    /// An unsolicited push event. The wire frame has no top-level `id`;
    /// the nested payload's own `id` names the subscription.
    Notification {
        /// Nested push payload.
        result: Notification,
    },
}

impl ServerMessage {
    /// Decodes a text frame into a classified message.
    ///
    /// # Errors
    ///
    /// - [`Error::PayloadTooComplex`] if the frame exceeds
    ///   [`MAX_FRAME_BYTES`] or the parser's nesting limit
    /// - [`Error::MalformedFrame`] if the frame is not valid JSON or
    ///   matches neither message shape
    pub fn decode(text: &str) -> Result<Self> {
        if text.len() > MAX_FRAME_BYTES {
            return Err(Error::payload_too_complex(format!(
                "frame is {} bytes (limit {MAX_FRAME_BYTES})",
                text.len()
            )));
        }

        serde_json::from_str(text).map_err(|e| {
            let message = e.to_string();
            // serde_json reports pathological nesting via its recursion limit
            if message.contains("recursion limit") {
                Error::payload_too_complex(message)
            } else {
                Error::malformed_frame(message)
            }
        })
    }
}

// ============================================================================
// Reply
// ============================================================================

/// A correlated reply from the server.
///
/// # Format
///
/// Success:
/// ```json
/// { "id": "uuid", "result": { ... } }
/// ```
///
/// Error:
/// ```json
/// { "id": "uuid", "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    /// Matches the request `id`.
    pub id: RequestId,

    /// Result payload (if success).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error payload (if error).
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    /// Returns `true` if this is a success reply.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Returns `true` if this is an error reply.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value, returning an error if the reply was
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Server`] carrying the server's code and message.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::server(err.code, err.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// ErrorPayload
// ============================================================================

/// Error payload carried by an error reply.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    /// Server-side error code.
    pub code: i64,

    /// Server-side error message.
    pub message: String,
}

// ============================================================================
// Notification
// ============================================================================

/// A live subscription push event.
///
/// # Format (nested inside the frame's `result` field)
///
/// ```json
/// { "id": "subscription-id", "action": "CREATE", "result": { ... } }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    /// Subscription the event belongs to.
    pub id: SubscriptionId,

    /// What happened to the matching record.
    #[serde(default)]
    pub action: Action,

    /// Event payload.
    #[serde(default, rename = "result")]
    pub data: Value,
}

// ============================================================================
// Action
// ============================================================================

/// Kind of change a push event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    /// A record was created.
    Create,
    /// A record was updated.
    Update,
    /// A record was deleted.
    Delete,
    /// The subscription was killed server-side.
    Kill,
    /// Unrecognized action string.
    #[default]
    Unknown,
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        match value {
            "CREATE" => Self::Create,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "KILL" => Self::Kill,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Kill => "KILL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> StdResult<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::from(value.as_str()))
    }
}

// ============================================================================
// Tests
// ============================================================================

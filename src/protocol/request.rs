//! Outbound request type.
//!
//! Every call on the streaming transport is encoded as a single request
//! frame carrying a client-chosen id, a method name, and positional
//! parameters. The client never inspects the method or parameters; they
//! come from the caller (or the query-builder layer above this crate)
//! and pass through verbatim.

// ============================================================================
// Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;

use crate::identifiers::RequestId;

// ============================================================================
// RpcRequest
// ============================================================================

/// A method invocation sent to the server.
///
/// # Format
///
/// ```json
/// {
///   "id": "uuid",
///   "method": "query",
///   "params": ["SELECT * FROM sensor"]
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    /// Unique identifier for request/reply correlation.
    pub id: RequestId,

    /// Method name, e.g. `query`, `live`, `kill`.
    pub method: String,

    /// Positional parameters, passed through untouched.
    pub params: Vec<Value>,
}

impl RpcRequest {
    /// Creates a new request with an auto-generated id.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id: RequestId::generate(),
            method: method.into(),
            params,
        }
    }

    /// Creates a new request with a specific id.
    #[inline]
    #[must_use]
    pub fn with_id(id: RequestId, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = RpcRequest::new("query", vec![json!("SELECT * FROM sensor")]);
        let text = serde_json::to_string(&request).expect("serialize");

        assert!(text.contains("\"method\":\"query\""));
        assert!(text.contains("SELECT * FROM sensor"));
        assert!(text.contains(&request.id.to_string()));
    }

    #[test]
    fn test_request_with_id() {
        let id = RequestId::generate();
        let request = RpcRequest::with_id(id, "ping", vec![]);
        assert_eq!(request.id, id);
        assert_eq!(request.method, "ping");
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = RpcRequest::new("ping", vec![]);
        let b = RpcRequest::new("ping", vec![]);
        assert_ne!(a.id, b.id);
    }
}

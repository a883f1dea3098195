//! JSON-RPC request and reply envelopes.
//!
//! The same envelope travels over HTTP bodies, the push socket and the
//! event bridge.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{Error, Result};
use crate::identifiers::{CorrelationId, SubscriberId};

// ============================================================================
// Constants
// ============================================================================

/// JSON-RPC protocol version tag.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method sent as the push-channel subscription handshake.
pub const SUBSCRIBE_METHOD: &str = "subscribe_transfer_activity";

// ============================================================================
// RpcRequest
// ============================================================================

/// An outgoing call.
///
/// # Format
///
/// ```json
/// {
///   "jsonrpc": "2.0",
///   "id": 2,
///   "method": "get_version",
///   "params": { ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,

    /// Correlation id echoed back by the reply.
    pub id: CorrelationId,

    /// Method name.
    pub method: String,

    /// Method parameters.
    pub params: Value,
}

impl RpcRequest {
    /// Creates a new request envelope.
    #[inline]
    #[must_use]
    pub fn new(id: CorrelationId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Creates the push-channel subscription handshake.
    ///
    /// Always carries the reserved [`CorrelationId::SUBSCRIBE`] id.
    #[inline]
    #[must_use]
    pub fn subscribe(subscriber: SubscriberId) -> Self {
        Self::new(
            CorrelationId::SUBSCRIBE,
            SUBSCRIBE_METHOD,
            json!([subscriber.to_string()]),
        )
    }
}

// ============================================================================
// RpcReply
// ============================================================================

/// A reply to an [`RpcRequest`].
///
/// # Format
///
/// Success: `{"id": 2, "result": ...}`
///
/// Error: `{"id": 2, "error": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    /// Matches the request `id`. Missing ids never match a pending call.
    #[serde(default)]
    pub id: Option<CorrelationId>,

    /// Result data (if success).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error data (if error).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl RpcReply {
    /// Creates a success reply.
    #[inline]
    #[must_use]
    pub fn success(id: CorrelationId, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Creates an error reply.
    #[inline]
    #[must_use]
    pub fn failure(id: CorrelationId, error: Value) -> Self {
        Self {
            id: Some(id),
            result: None,
            error: Some(error),
        }
    }

    /// Returns `true` if this reply carries an error member.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteRejected`] if the reply carries an error.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(error) => Err(Error::remote_rejected(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

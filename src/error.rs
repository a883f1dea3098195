//! Error types for the agent link.
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`].
//!
//! ```ignore
//! use agent_link::{AgentClient, Result};
//!
//! async fn version(client: &AgentClient) -> Result<serde_json::Value> {
//!     client.request("get_version", serde_json::json!({})).await
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Channel | [`Error::ChannelNotReady`], [`Error::ChannelLost`], [`Error::ChannelClosed`] |
//! | Remote | [`Error::RemoteRejected`], [`Error::Http`] |
//! | Diagnostics | [`Error::UnknownReply`], [`Error::InvalidListener`] |
//! | Configuration | [`Error::Config`] |
//! | Protocol | [`Error::Protocol`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Request`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// No transport has completed discovery or handshake yet.
    ///
    /// Also returned by the event bridge while the endpoint is not live.
    #[error("Channel not ready")]
    ChannelNotReady,

    /// The channel died while the call was pending.
    #[error("Channel lost")]
    ChannelLost,

    /// The reply channel was dropped without a value.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The backend answered with an explicit error.
    #[error("Remote rejected call: {message}")]
    RemoteRejected {
        /// Human-readable message extracted from the reply.
        message: String,
        /// Raw error payload from the reply, if any.
        debug_data: Option<Value>,
    },

    /// The HTTP gateway answered with a non-2xx status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// Numeric status code.
        status: u16,
        /// Status text.
        message: String,
    },

    // ========================================================================
    // Diagnostic Errors
    // ========================================================================
    /// A reply arrived for an id that is not pending.
    ///
    /// Logged and counted, never surfaced to a caller.
    #[error("Reply for unknown call {id}")]
    UnknownReply {
        /// The unmatched correlation id.
        id: CorrelationId,
    },

    /// A register call was given no callable listener.
    #[error("Listener is not callable")]
    InvalidListener,

    // ========================================================================
    // Configuration / Protocol Errors
    // ========================================================================
    /// Invalid link configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Protocol violation or unexpected message shape.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
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
    WebSocket(#[from] Box<WsError>),

    /// HTTP client error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<WsError> for Error {
    fn from(err: WsError) -> Self {
        Self::WebSocket(Box::new(err))
    }
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

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a remote rejection from a JSON-RPC `error` member.
    ///
    /// The message is taken from `user_message`, `message` or
    /// `internal_message` (first present), or from the value itself when it
    /// is a plain string.
    pub fn remote_rejected(error: Value) -> Self {
        let message = match &error {
            Value::String(text) => text.clone(),
            other => ["user_message", "message", "internal_message"]
                .iter()
                .find_map(|key| other.get(*key).and_then(Value::as_str))
                .map_or_else(|| other.to_string(), str::to_string),
        };

        Self::RemoteRejected {
            message,
            debug_data: Some(error),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error comes from the channel itself rather
    /// than from the remote answer.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotReady
                | Self::ChannelLost
                | Self::ChannelClosed(_)
                | Self::WebSocket(_)
                | Self::Request(_)
        )
    }

    /// Returns `true` if retrying the same call may succeed.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ChannelNotReady | Self::ChannelLost | Self::ChannelClosed(_)
        )
    }
}

// ============================================================================
// ErrorPayload
// ============================================================================

/// Structured error shape handed to hosts that expect
/// `{error: true, message, debugData?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    /// Always `true`.
    pub error: bool,
    /// Human-readable message.
    pub message: String,
    /// Raw remote payload, when the remote supplied one.
    #[serde(rename = "debugData", skip_serializing_if = "Option::is_none")]
    pub debug_data: Option<Value>,
}

impl Error {
    /// Converts this error into the structured host payload.
    #[must_use]
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::RemoteRejected {
                message,
                debug_data,
            } => ErrorPayload {
                error: true,
                message: message.clone(),
                debug_data: debug_data.clone(),
            },
            other => ErrorPayload {
                error: true,
                message: other.to_string(),
                debug_data: None,
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

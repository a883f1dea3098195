//! Transport layer.
//!
//! Two request/response strategies share one contract, [`Transport`]:
//! HTTP JSON-RPC and the extension bridge. Each owns its own
//! [`PendingCalls`] registry.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐        POST /rpc           ┌──────────────┐
//! │ HttpTransport│───────────────────────────►│              │
//! │              │                            │   Transfer   │
//! │ PushChannel  │◄───── ws://host:PORT ──────│    Agent     │
//! └──────────────┘    (33024..=33029)         └──────────────┘
//!
//! ┌──────────────┐   <ns>.Request / .Ping     ┌──────────────┐
//! │ EventBridge  │───────────────────────────►│  Extension   │
//! │              │◄── .Response / .Pong ──────│              │
//! └──────────────┘                            └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `bridge` | Extension bridge transport with heartbeat |
//! | `channel` | Message channel underneath the bridge |
//! | `http` | HTTP JSON-RPC transport |
//! | `liveness` | Heartbeat bookkeeping |
//! | `pending` | Pending-call registry |
//! | `push` | Push channel discovery and event loop |
//! | `state` | Push channel state machine |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// Extension bridge transport.
pub mod bridge;

/// Bridge message channel.
pub mod channel;

/// HTTP JSON-RPC transport.
pub mod http;

/// Heartbeat bookkeeping.
pub mod liveness;

/// Pending-call registry.
pub mod pending;

/// Push channel.
pub mod push;

/// Push channel state machine.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use bridge::EventBridge;
pub use channel::{BridgeLink, MemoryChannel, MemoryEndpoint, MessageChannel};
pub use http::HttpTransport;
pub use liveness::LivenessTracker;
pub use pending::{CallReceiver, PendingCalls};
pub use push::{PushChannel, TopicHandler, probe_ports};
pub use state::{ConnectionEvent, ConnectionState};

// ============================================================================
// TransportKind
// ============================================================================

/// The request/response strategy in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransportKind {
    /// HTTP JSON-RPC plus the WebSocket push channel.
    Http,
    /// Custom events through a browser extension.
    EventBridge,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::EventBridge => f.write_str("event-bridge"),
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

/// Uniform request/response contract.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns which strategy this is.
    fn kind(&self) -> TransportKind;

    /// Performs one correlated call.
    ///
    /// # Errors
    ///
    /// Strategy-specific; see [`HttpTransport::request`] and
    /// [`EventBridge::request`].
    async fn request(&self, method: &str, params: Value) -> Result<Value>;

    /// Releases the strategy's background work and pending calls.
    fn shutdown(&self);
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        HttpTransport::request(self, method, params).await
    }

    fn shutdown(&self) {
        HttpTransport::shutdown(self);
    }
}

#[async_trait]
impl Transport for EventBridge {
    fn kind(&self) -> TransportKind {
        TransportKind::EventBridge
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        EventBridge::request(self, method, params).await
    }

    fn shutdown(&self) {
        EventBridge::shutdown(self);
    }
}

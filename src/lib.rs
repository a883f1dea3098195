//! Agent Link - Client-side link to a local transfer agent.
//!
//! This library lets an application drive a locally running transfer agent
//! through one request/response and activity API, whichever channel
//! actually reaches the agent.
//!
//! # Architecture
//!
//! The client picks one transport when it is built:
//!
//! - **HTTP**: JSON-RPC over `POST`, plus a WebSocket push channel that is
//!   discovered on a small port range and reconnected on drop
//! - **Extension bridge**: JSON-RPC over custom events exchanged with a
//!   browser extension, with heartbeat-based liveness
//!
//! Key design principles:
//!
//! - Every call is correlated by id and settles exactly once
//! - Losing a channel rejects every call pending on it
//! - Status notifications are deduplicated and replayed to late listeners
//!
//! # Quick Start
//!
//! ```no_run
//! use agent_link::{AgentClient, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = AgentClient::builder().build()?;
//!     client.start();
//!
//!     client.register_status_callback(|status| println!("agent: {status}"));
//!     client.register_activity_callback(|batch| {
//!         for record in batch {
//!             println!("transfer {} updated", record.uuid);
//!         }
//!     });
//!
//!     let info = client.request("get_info", json!({})).await?;
//!     println!("{info}");
//!
//!     client.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`activity`] | Listener registries, status cells, transfer store |
//! | [`client`] | [`AgentClient`] facade and configuration |
//! | [`diagnostics`] | Anomaly counters |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | JSON-RPC envelopes, push messages, bridge events |
//! | [`transport`] | HTTP, push channel and extension bridge |

// ============================================================================
// Modules
// ============================================================================

/// Activity broadcast.
///
/// - [`ActivityHub`] - The four listener sets of one client
/// - [`TransferStore`] - Caller-side merge of batches by `uuid`
pub mod activity;

/// Client facade and configuration.
///
/// Use [`AgentClient::builder()`] to create a configured client.
pub mod client;

/// Diagnostics counters.
pub mod diagnostics;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Activity types
pub use activity::{
    ActivityBatch, ActivityHub, CallbackRegistry, ConnectionStatus, EventClass, Listener,
    StatusCell, TransferStore,
};

// Client types
pub use client::{AgentClient, ClientBuilder, Environment, LinkConfig};

// Diagnostics
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};

// Error types
pub use error::{Error, ErrorPayload, Result};

// Identifier types
pub use identifiers::{CorrelationId, RegistrationId, SubscriberId};

// Protocol types
pub use protocol::{BridgeEvent, BridgeEventKind, TransferRecord};

// Transport types
pub use transport::{
    BridgeLink, ConnectionState, EventBridge, HttpTransport, MemoryChannel, MemoryEndpoint,
    MessageChannel, PushChannel, Transport, TransportKind,
};

//! Wire message types.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Carried by |
//! |--------------|-----------|------------|
//! | `RpcRequest` | Local → Remote | HTTP body, push socket, bridge event |
//! | `RpcReply` | Remote → Local | HTTP body, push socket, bridge event |
//! | `PushMessage` | Remote → Local | Push socket |
//! | `BridgeEvent` | Both | Extension bridge |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Push messages and bridge events |
//! | `record` | Transfer records and batch parsing |
//! | `request` | JSON-RPC request/reply envelopes |

// ============================================================================
// Submodules
// ============================================================================

/// Push messages and bridge events.
pub mod event;

/// Transfer records.
pub mod record;

/// JSON-RPC envelopes.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use event::{
    BridgeEvent, BridgeEventKind, PushKind, PushMessage, TOPIC_TRANSFER_ACTIVITY,
    TOPIC_TRANSFERS_REMOVED,
};
pub use record::{TransferRecord, parse_batch};
pub use request::{JSONRPC_VERSION, RpcReply, RpcRequest, SUBSCRIBE_METHOD};

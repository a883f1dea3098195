//! Activity broadcast.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `hub` | Per-client set of the four listener classes |
//! | `registry` | Listener registry for one event class |
//! | `status` | Status cells with duplicate suppression |
//! | `store` | Caller-side merge of batches by `uuid` |

// ============================================================================
// Submodules
// ============================================================================

/// Per-client broadcast hub.
pub mod hub;

/// Listener registry.
pub mod registry;

/// Status cells.
pub mod status;

/// Transfer store.
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use hub::{ActivityBatch, ActivityHub, EventClass};
pub use registry::{CallbackRegistry, Listener};
pub use status::{ConnectionStatus, StatusCell};
pub use store::TransferStore;

//! Per-client broadcast hub.
//!
//! Owns the four listener sets of one client and is shared (`Arc`) by the
//! channel tasks that produce events and the callers that consume them.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;
use tracing::trace;

use crate::diagnostics::Diagnostics;
use crate::identifiers::RegistrationId;
use crate::protocol::{TransferRecord, parse_batch};

use super::registry::CallbackRegistry;
use super::status::{ConnectionStatus, StatusCell};

// ============================================================================
// Types
// ============================================================================

/// Batch of transfer records, in the order the agent sent them.
pub type ActivityBatch = Vec<TransferRecord>;

// ============================================================================
// ActivityHub
// ============================================================================

/// Broadcast registries for transfer activity, removals, connection status
/// and endpoint liveness.
#[derive(Debug)]
pub struct ActivityHub {
    activity: CallbackRegistry<ActivityBatch>,
    removed: CallbackRegistry<ActivityBatch>,
    connection: StatusCell<ConnectionStatus>,
    liveness: StatusCell<bool>,
    diagnostics: Diagnostics,
}

impl Default for ActivityHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityHub {
    /// Creates a hub with no listeners, status `Closed` and liveness `false`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            activity: CallbackRegistry::new("transfer-activity"),
            removed: CallbackRegistry::new("transfer-removed"),
            connection: StatusCell::new("connection-status", ConnectionStatus::Closed),
            liveness: StatusCell::new("liveness-status", false),
            diagnostics: Diagnostics::default(),
        }
    }
}

// ============================================================================
// ActivityHub - Consumers
// ============================================================================

impl ActivityHub {
    /// Listener set for updated transfers.
    #[inline]
    #[must_use]
    pub fn activity(&self) -> &CallbackRegistry<ActivityBatch> {
        &self.activity
    }

    /// Listener set for removed transfers.
    #[inline]
    #[must_use]
    pub fn removed(&self) -> &CallbackRegistry<ActivityBatch> {
        &self.removed
    }

    /// Connection status cell.
    #[inline]
    #[must_use]
    pub fn connection(&self) -> &StatusCell<ConnectionStatus> {
        &self.connection
    }

    /// Endpoint liveness cell.
    #[inline]
    #[must_use]
    pub fn liveness(&self) -> &StatusCell<bool> {
        &self.liveness
    }

    /// Channel diagnostics counters.
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Removes a listener from whichever set issued `id` for `class`.
    pub fn deregister(&self, class: EventClass, id: RegistrationId) -> bool {
        match class {
            EventClass::Activity => self.activity.deregister(id),
            EventClass::Removed => self.removed.deregister(id),
            EventClass::Connection => self.connection.deregister(id),
            EventClass::Liveness => self.liveness.deregister(id),
        }
    }
}

// ============================================================================
// ActivityHub - Producers
// ============================================================================

impl ActivityHub {
    /// Relays a raw activity payload to the activity listeners.
    ///
    /// Empty batches are not relayed.
    pub fn publish_activity(&self, payload: Value) {
        let batch = parse_batch(payload);
        if batch.is_empty() {
            trace!("Empty activity batch");
            return;
        }
        trace!(count = batch.len(), "Relaying activity batch");
        self.activity.emit(&batch);
    }

    /// Relays a raw removal payload to the removed listeners.
    pub fn publish_removed(&self, payload: Value) {
        let batch = parse_batch(payload);
        if batch.is_empty() {
            trace!("Empty removal batch");
            return;
        }
        trace!(count = batch.len(), "Relaying removal batch");
        self.removed.emit(&batch);
    }

    /// Updates the connection status. Repeated values are suppressed.
    #[inline]
    pub fn set_connection(&self, status: ConnectionStatus) -> bool {
        self.connection.set(status)
    }

    /// Updates endpoint liveness. Repeated values are suppressed.
    #[inline]
    pub fn set_liveness(&self, live: bool) -> bool {
        self.liveness.set(live)
    }
}

// ============================================================================
// EventClass
// ============================================================================

/// The four listener classes a hub serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Updated transfers.
    Activity,
    /// Removed transfers.
    Removed,
    /// Connection status.
    Connection,
    /// Endpoint liveness.
    Liveness,
}

// ============================================================================
// Tests
// ============================================================================

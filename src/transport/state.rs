//! Push-channel connection state machine.
//!
//! # Transition Table
//!
//! | From | Event | To |
//! |------|-------|----|
//! | `Disconnected` | `Discover` | `Connecting` |
//! | `Connecting` | `ProbeSucceeded` | `Open` |
//! | `Connecting` | `ProbesExhausted` | `Disconnected` |
//! | `Open` | `Dropped` | `Disconnected` |
//! | any but `Closed` | `Shutdown` | `Closed` |
//!
//! `Closed` is terminal. Every other pair is rejected.

use std::fmt;

use serde::Serialize;

// ============================================================================
// ConnectionState
// ============================================================================

/// State of one push-channel instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket, waiting to (re)start discovery.
    #[default]
    Disconnected,
    /// Probing the port range.
    Connecting,
    /// Socket open. Ready once the subscription is acknowledged.
    Open,
    /// Shut down for good.
    Closed,
}

/// Inputs of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    /// Start a discovery cycle.
    Discover,
    /// A port accepted the socket.
    ProbeSucceeded,
    /// No port in the range accepted the socket.
    ProbesExhausted,
    /// The open socket closed or failed.
    Dropped,
    /// The owner shut the channel down.
    Shutdown,
}

impl ConnectionState {
    /// Returns the state reached from `self` on `event`, or `None` if the
    /// transition is not allowed.
    #[must_use]
    pub const fn on(self, event: ConnectionEvent) -> Option<Self> {
        use ConnectionEvent as E;

        match (self, event) {
            (Self::Closed, _) => None,
            (_, E::Shutdown) => Some(Self::Closed),
            (Self::Disconnected, E::Discover) => Some(Self::Connecting),
            (Self::Connecting, E::ProbeSucceeded) => Some(Self::Open),
            (Self::Connecting, E::ProbesExhausted) => Some(Self::Disconnected),
            (Self::Open, E::Dropped) => Some(Self::Disconnected),
            _ => None,
        }
    }

    /// Returns `true` while a socket is open.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Tests
// ============================================================================

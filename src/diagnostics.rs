//! Channel diagnostics counters.
//!
//! Anomalies that are only logged (late replies, heartbeat misses) are also
//! counted here so a host can surface them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters, updated by the channel tasks.
#[derive(Debug, Default)]
pub struct Diagnostics {
    unknown_replies: AtomicU64,
    liveness_losses: AtomicU64,
    reconnects: AtomicU64,
    failed_discoveries: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    /// Replies that matched no pending call.
    pub unknown_replies: u64,
    /// live → not-live transitions of the extension bridge.
    pub liveness_losses: u64,
    /// Push-channel handshakes completed.
    pub reconnects: u64,
    /// Discovery cycles in which no port answered.
    pub failed_discoveries: u64,
}

impl Diagnostics {
    #[inline]
    pub(crate) fn record_unknown_reply(&self) {
        self.unknown_replies.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_liveness_loss(&self) {
        self.liveness_losses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_failed_discovery(&self) {
        self.failed_discoveries.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            unknown_replies: self.unknown_replies.load(Ordering::Relaxed),
            liveness_losses: self.liveness_losses.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            failed_discoveries: self.failed_discoveries.load(Ordering::Relaxed),
        }
    }
}

//! Heartbeat bookkeeping for the extension bridge.
//!
//! The bridge sends a ping every interval and evaluates the round trip at
//! `ping + tolerance`. The endpoint is live while the latest ping has been
//! acknowledged within the tolerance.

use std::time::Duration;

use tokio::time::Instant;

/// Ping/pong timestamps of one bridge.
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    tolerance: Duration,
    last_ping: Option<Instant>,
    last_pong: Option<Instant>,
}

impl LivenessTracker {
    /// Creates a tracker with no heartbeat sent yet.
    #[must_use]
    pub const fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            last_ping: None,
            last_pong: None,
        }
    }

    /// Records a ping sent at `now`.
    ///
    /// Returns the instant at which it should be evaluated.
    pub fn record_ping(&mut self, now: Instant) -> Instant {
        self.last_ping = Some(now);
        now + self.tolerance
    }

    /// Records an acknowledgement received at `now`.
    ///
    /// Returns `Some(true)` if it answers the latest ping in time, which
    /// lets the bridge flip to live without waiting for the deadline.
    /// Late or unsolicited acknowledgements return `None`.
    pub fn record_pong(&mut self, now: Instant) -> Option<bool> {
        self.last_pong = Some(now);

        let ping = self.last_ping?;
        (now.saturating_duration_since(ping) <= self.tolerance).then_some(true)
    }

    /// Evaluates the latest round trip.
    ///
    /// Returns `None` before the first ping. Otherwise the endpoint is live
    /// only if the latest acknowledgement is not older than the latest ping
    /// and arrived within the tolerance.
    #[must_use]
    pub fn evaluate(&self) -> Option<bool> {
        let ping = self.last_ping?;

        let live = match self.last_pong {
            Some(pong) if pong >= ping => pong.duration_since(ping) <= self.tolerance,
            _ => false,
        };
        Some(live)
    }

    /// Forgets all timestamps.
    pub fn reset(&mut self) {
        self.last_ping = None;
        self.last_pong = None;
    }

    /// Returns the configured tolerance.
    #[inline]
    #[must_use]
    pub const fn tolerance(&self) -> Duration {
        self.tolerance
    }
}

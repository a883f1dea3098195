//! Bidirectional message channel underneath the extension bridge.
//!
//! The bridge only needs to dispatch an event and to receive the events
//! the other side dispatches. A host adapter (DOM custom events, a native
//! messaging pipe) implements [`MessageChannel`] and feeds inbound events
//! into the [`BridgeLink`] receiver. [`MemoryChannel`] is the in-process
//! adapter.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};
use crate::protocol::BridgeEvent;

// ============================================================================
// MessageChannel
// ============================================================================

/// Outbound half of a bridge channel.
pub trait MessageChannel: Send + Sync {
    /// Dispatches `event` to the other side.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel can no longer deliver events.
    fn dispatch(&self, event: BridgeEvent) -> Result<()>;
}

// ============================================================================
// BridgeLink
// ============================================================================

/// Both halves of a bridge channel, as seen by the bridge.
pub struct BridgeLink {
    /// Outbound half.
    pub channel: Arc<dyn MessageChannel>,
    /// Inbound events.
    pub events: mpsc::UnboundedReceiver<BridgeEvent>,
}

impl BridgeLink {
    /// Bundles an outbound channel with its inbound event stream.
    #[must_use]
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        events: mpsc::UnboundedReceiver<BridgeEvent>,
    ) -> Self {
        Self { channel, events }
    }
}

impl fmt::Debug for BridgeLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeLink").finish_non_exhaustive()
    }
}

// ============================================================================
// MemoryChannel
// ============================================================================

/// In-process [`MessageChannel`] backed by unbounded queues.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    outbound: mpsc::UnboundedSender<BridgeEvent>,
}

impl MemoryChannel {
    /// Creates a connected pair: the bridge side and the remote endpoint.
    #[must_use]
    pub fn pair() -> (BridgeLink, MemoryEndpoint) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let link = BridgeLink::new(
            Arc::new(Self {
                outbound: outbound_tx,
            }),
            inbound_rx,
        );
        let endpoint = MemoryEndpoint {
            received: outbound_rx,
            sender: inbound_tx,
        };

        (link, endpoint)
    }
}

impl MessageChannel for MemoryChannel {
    fn dispatch(&self, event: BridgeEvent) -> Result<()> {
        trace!(kind = %event.kind, "Dispatching bridge event");
        self.outbound
            .send(event)
            .map_err(|_| Error::protocol("Bridge endpoint is gone"))
    }
}

// ============================================================================
// MemoryEndpoint
// ============================================================================

/// Remote side of a [`MemoryChannel`].
#[derive(Debug)]
pub struct MemoryEndpoint {
    received: mpsc::UnboundedReceiver<BridgeEvent>,
    sender: mpsc::UnboundedSender<BridgeEvent>,
}

impl MemoryEndpoint {
    /// Waits for the next event dispatched by the bridge.
    ///
    /// Returns `None` once the bridge side is dropped.
    pub async fn recv(&mut self) -> Option<BridgeEvent> {
        self.received.recv().await
    }

    /// Returns the next dispatched event if one is queued.
    pub fn try_recv(&mut self) -> Option<BridgeEvent> {
        self.received.try_recv().ok()
    }

    /// Delivers `event` to the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the bridge stopped listening.
    pub fn send(&self, event: BridgeEvent) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| Error::protocol("Bridge is no longer listening"))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::BridgeEventKind;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (mut link, mut endpoint) = MemoryChannel::pair();

        link.channel
            .dispatch(BridgeEvent::new(BridgeEventKind::Ping, json!({})))
            .expect("dispatch");
        let sent = endpoint.recv().await.expect("event");
        assert_eq!(sent.kind, BridgeEventKind::Ping);

        endpoint
            .send(BridgeEvent::new(BridgeEventKind::Pong, json!({})))
            .expect("send");
        let received = link.events.recv().await.expect("event");
        assert_eq!(received.kind, BridgeEventKind::Pong);
    }

    #[test]
    fn test_dispatch_after_endpoint_dropped() {
        let (link, endpoint) = MemoryChannel::pair();
        drop(endpoint);

        let err = link
            .channel
            .dispatch(BridgeEvent::new(BridgeEventKind::Ping, json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::Protocol { .. }));
    }
}

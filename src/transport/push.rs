//! Push channel discovery and event loop.
//!
//! The agent serves its push channel on one port of a small range. The
//! channel probes the range in ascending order, subscribes on the first
//! port that opens, then routes topic messages to their handlers until
//! the socket drops. Every drop, and every cycle in which no port opens,
//! is followed by the reconnect backoff and a new discovery cycle.
//!
//! See [`ConnectionState`] for the transition table.
//!
//! # Status Events
//!
//! | Moment | Connection status |
//! |--------|-------------------|
//! | Subscription acknowledged | `RECONNECT` |
//! | Socket closed or failed | `CLOSED` |
//! | Shutdown | `CLOSED` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityHub, ConnectionStatus};
use crate::client::LinkConfig;
use crate::error::{Error, Result};
use crate::identifiers::SubscriberId;
use crate::protocol::{
    PushKind, PushMessage, RpcRequest, TOPIC_TRANSFER_ACTIVITY, TOPIC_TRANSFERS_REMOVED,
};

use super::state::{ConnectionEvent, ConnectionState};

// ============================================================================
// Types
// ============================================================================

/// Socket type of the push channel.
pub type PushStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handler for one push topic. Receives the unwrapped payload.
pub type TopicHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Internal commands for the event loop.
enum PushCommand {
    /// Close the socket and stop reconnecting.
    Shutdown,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Socket closed, failed or refused the subscription.
    Dropped,
    /// Shutdown requested.
    Shutdown,
}

// ============================================================================
// Discovery
// ============================================================================

/// Tries `connect` on each port of `ports` in ascending order.
///
/// Returns the first port that connects together with its connection.
/// Ports after the winner are not tried.
pub async fn probe_ports<T, F, Fut>(ports: RangeInclusive<u16>, mut connect: F) -> Option<(u16, T)>
where
    F: FnMut(u16) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for port in ports {
        match connect(port).await {
            Ok(connection) => {
                debug!(port, "Push channel port answered");
                return Some((port, connection));
            }
            Err(e) => trace!(port, error = %e, "Port probe failed"),
        }
    }
    None
}

/// Opens the push socket on `port`, bounded by the probe timeout.
async fn open(config: &LinkConfig, port: u16) -> Result<PushStream> {
    let url = config.push_url(port);

    let (stream, _response) = timeout(config.probe_timeout, connect_async(url.as_str()))
        .await
        .map_err(|_| Error::protocol(format!("Timed out opening {url}")))??;

    Ok(stream)
}

// ============================================================================
// PushChannel
// ============================================================================

/// Self-healing push channel to the agent.
///
/// Cheap to clone; clones share the same event loop.
#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<PushInner>,
}

struct PushInner {
    config: LinkConfig,
    hub: Arc<ActivityHub>,
    subscriber: SubscriberId,
    state: Mutex<ConnectionState>,
    ready: AtomicBool,
    port: Mutex<Option<u16>>,
    topics: Mutex<FxHashMap<String, TopicHandler>>,
    command_tx: mpsc::UnboundedSender<PushCommand>,
    command_rx: Mutex<Option<mpsc::UnboundedReceiver<PushCommand>>>,
}

impl PushChannel {
    /// Creates a channel that relays the activity and removal topics to
    /// `hub`. Nothing is opened until [`start`].
    ///
    /// [`start`]: Self::start
    #[must_use]
    pub fn new(config: LinkConfig, hub: Arc<ActivityHub>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let mut topics: FxHashMap<String, TopicHandler> = FxHashMap::default();
        let activity_hub = Arc::clone(&hub);
        topics.insert(
            TOPIC_TRANSFER_ACTIVITY.to_string(),
            Arc::new(move |payload| activity_hub.publish_activity(payload)),
        );
        let removed_hub = Arc::clone(&hub);
        topics.insert(
            TOPIC_TRANSFERS_REMOVED.to_string(),
            Arc::new(move |payload| removed_hub.publish_removed(payload)),
        );

        let inner = PushInner {
            config,
            hub,
            subscriber: SubscriberId::generate(),
            state: Mutex::new(ConnectionState::default()),
            ready: AtomicBool::new(false),
            port: Mutex::new(None),
            topics: Mutex::new(topics),
            command_tx,
            command_rx: Mutex::new(Some(command_rx)),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Routes messages of `topic` to `handler`, replacing any previous one.
    pub fn on_topic<F>(&self, topic: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .topics
            .lock()
            .insert(topic.into(), Arc::new(handler));
    }

    /// Spawns the discovery loop. Later calls do nothing.
    pub fn start(&self) {
        let Some(commands) = self.inner.command_rx.lock().take() else {
            trace!("Push channel already started");
            return;
        };

        debug!(
            first = self.inner.config.first_port,
            last = self.inner.config.last_port,
            "Starting push channel discovery"
        );
        tokio::spawn(PushInner::run_event_loop(Arc::clone(&self.inner), commands));
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` once the subscription is acknowledged on the current
    /// socket.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Returns the port of the open socket.
    #[inline]
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        *self.inner.port.lock()
    }

    /// Returns the subscriber id sent in the handshake.
    #[inline]
    #[must_use]
    pub fn subscriber(&self) -> SubscriberId {
        self.inner.subscriber
    }

    /// Closes the socket and stops reconnecting. Idempotent.
    pub fn shutdown(&self) {
        self.inner.close();
        let _ = self.inner.command_tx.send(PushCommand::Shutdown);
    }
}

impl fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushChannel")
            .field("state", &self.state())
            .field("ready", &self.is_ready())
            .field("port", &self.port())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// PushInner - State
// ============================================================================

impl PushInner {
    /// Applies `event`. Returns `false` if the transition is not allowed.
    fn transition(&self, event: ConnectionEvent) -> bool {
        let mut state = self.state.lock();

        match state.on(event) {
            Some(next) => {
                trace!(from = %*state, to = %next, ?event, "Push channel transition");
                *state = next;
                true
            }
            None => {
                trace!(state = %*state, ?event, "Transition ignored");
                false
            }
        }
    }

    fn on_dropped(&self) {
        self.ready.store(false, Ordering::Release);
        *self.port.lock() = None;
        self.transition(ConnectionEvent::Dropped);
        self.hub.set_connection(ConnectionStatus::Closed);
    }

    fn close(&self) {
        self.transition(ConnectionEvent::Shutdown);
        self.ready.store(false, Ordering::Release);
        *self.port.lock() = None;
        self.hub.set_connection(ConnectionStatus::Closed);
    }
}

// ============================================================================
// PushInner - Event Loop
// ============================================================================

impl PushInner {
    async fn run_event_loop(this: Arc<Self>, mut commands: mpsc::UnboundedReceiver<PushCommand>) {
        loop {
            if !this.transition(ConnectionEvent::Discover) {
                break;
            }

            let config = &this.config;
            let probe = probe_ports(config.ports(), move |port| open(config, port));
            let found = tokio::select! {
                found = probe => found,
                _ = commands.recv() => break,
            };

            match found {
                Some((port, stream)) => {
                    if !this.transition(ConnectionEvent::ProbeSucceeded) {
                        break;
                    }
                    *this.port.lock() = Some(port);
                    info!(port, "Push channel open");

                    let end = Self::run_session(&this, stream, &mut commands).await;
                    this.on_dropped();
                    if end == SessionEnd::Shutdown {
                        break;
                    }
                    info!(port, "Push channel dropped");
                }
                None => {
                    this.transition(ConnectionEvent::ProbesExhausted);
                    this.hub.diagnostics().record_failed_discovery();
                    debug!("No push channel port answered");
                }
            }

            tokio::select! {
                () = sleep(this.config.reconnect_backoff) => {}
                _ = commands.recv() => break,
            }
        }

        this.close();
        debug!("Push channel event loop terminated");
    }

    /// Subscribes on `stream` and routes messages until it ends.
    async fn run_session(
        this: &Arc<Self>,
        stream: PushStream,
        commands: &mut mpsc::UnboundedReceiver<PushCommand>,
    ) -> SessionEnd {
        let (mut ws_write, mut ws_read) = stream.split();

        let handshake = match serde_json::to_string(&RpcRequest::subscribe(this.subscriber)) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to encode subscription");
                return SessionEnd::Dropped;
            }
        };
        if let Err(e) = ws_write.send(Message::Text(handshake.into())).await {
            warn!(error = %e, "Failed to send subscription");
            return SessionEnd::Dropped;
        }
        debug!(subscriber = %this.subscriber, "Subscription sent");

        let handshake_deadline = sleep(this.config.handshake_timeout);
        tokio::pin!(handshake_deadline);

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            if !this.handle_message(&text) {
                                return SessionEnd::Dropped;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("Push channel closed by remote");
                            return SessionEnd::Dropped;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "Push channel error");
                            return SessionEnd::Dropped;
                        }

                        None => {
                            debug!("Push channel stream ended");
                            return SessionEnd::Dropped;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                () = &mut handshake_deadline, if !this.ready.load(Ordering::Acquire) => {
                    warn!(
                        timeout_ms = this.config.handshake_timeout.as_millis() as u64,
                        "Subscription not acknowledged"
                    );
                    return SessionEnd::Dropped;
                }

                _ = commands.recv() => {
                    debug!("Shutdown command received");
                    let _ = ws_write.close().await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Handles one text frame. Returns `false` if the session must end.
    fn handle_message(&self, text: &str) -> bool {
        let message: PushMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to parse push message");
                return true;
            }
        };

        match message.classify() {
            PushKind::HandshakeAck(reply) => {
                if self.ready.load(Ordering::Acquire) {
                    debug!("Duplicate subscription acknowledgement ignored");
                    return true;
                }
                if reply.is_error() {
                    warn!(error = ?reply.error, "Subscription refused");
                    return false;
                }

                self.ready.store(true, Ordering::Release);
                self.hub.diagnostics().record_reconnect();
                info!(port = ?*self.port.lock(), "Push channel ready");
                self.hub.set_connection(ConnectionStatus::Reconnect);
                true
            }

            PushKind::Topic { topic, payload } => {
                let handler = self.topics.lock().get(&topic).cloned();
                match handler {
                    Some(handler) => handler(payload),
                    None => trace!(%topic, "No handler for topic"),
                }
                true
            }

            PushKind::Unrecognized => {
                trace!(text, "Unrecognized push message");
                true
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    fn channel() -> (PushChannel, Arc<ActivityHub>) {
        let hub = Arc::new(ActivityHub::new());
        (PushChannel::new(LinkConfig::default(), Arc::clone(&hub)), hub)
    }

    #[tokio::test]
    async fn test_probe_stops_at_first_success() {
        let tried = Arc::new(Mutex::new(Vec::new()));

        let found = probe_ports(33024..=33029, |port| {
            let tried = Arc::clone(&tried);
            async move {
                tried.lock().push(port);
                if port >= 33027 {
                    Ok(u32::from(port) * 10)
                } else {
                    Err(Error::protocol("refused"))
                }
            }
        })
        .await;

        assert_eq!(found, Some((33027, 330_270)));
        assert_eq!(*tried.lock(), vec![33024, 33025, 33026, 33027]);
    }

    #[tokio::test]
    async fn test_probe_all_fail() {
        let attempts = AtomicUsize::new(0);

        let found: Option<(u16, ())> = probe_ports(33024..=33029, |_| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::protocol("refused")) }
        })
        .await;

        assert!(found.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_handshake_ack_once() {
        let (channel, hub) = channel();

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&statuses);
        hub.connection().register(move |status| recorded.lock().push(*status));

        let ack = r#"{"jsonrpc": "2.0", "id": 1, "result": true}"#;
        assert!(channel.inner.handle_message(ack));
        assert!(channel.is_ready());
        assert!(channel.inner.handle_message(ack));

        assert_eq!(
            *statuses.lock(),
            vec![ConnectionStatus::Closed, ConnectionStatus::Reconnect]
        );
        assert_eq!(hub.diagnostics().snapshot().reconnects, 1);
    }

    #[test]
    fn test_refused_handshake_ends_session() {
        let (channel, _hub) = channel();
        let refusal = r#"{"id": 1, "error": {"message": "no"}}"#;
        assert!(!channel.inner.handle_message(refusal));
        assert!(!channel.is_ready());
    }

    #[test]
    fn test_topic_routing() {
        let (channel, hub) = channel();

        let received = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&received);
        hub.activity()
            .register(move |batch: &Vec<_>| recorded.lock().push(batch.len()));

        let custom = Arc::new(Mutex::new(None));
        let seen = Arc::clone(&custom);
        channel.on_topic("agent_status", move |payload| *seen.lock() = Some(payload));

        let activity = json!({
            "id": 7,
            "method": "transfer_activity",
            "params": {"result": [{"uuid": "a"}, {"uuid": "b"}, {"uuid": "c"}]}
        });
        assert!(channel.inner.handle_message(&activity.to_string()));
        assert!(channel.inner.handle_message(
            r#"{"id": 8, "method": "agent_status", "params": {"result": "up"}}"#
        ));
        assert!(channel.inner.handle_message(r#"{"id": 9, "method": "unknown_topic"}"#));
        assert!(channel.inner.handle_message("not json"));

        assert_eq!(*received.lock(), vec![3]);
        assert_eq!(*custom.lock(), Some(json!("up")));
    }

    #[test]
    fn test_drop_emits_closed_once() {
        let (channel, hub) = channel();

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&statuses);
        hub.connection().register(move |status| recorded.lock().push(*status));

        let inner = &channel.inner;
        assert!(inner.transition(ConnectionEvent::Discover));
        assert!(inner.transition(ConnectionEvent::ProbeSucceeded));
        inner.handle_message(r#"{"id": 1, "result": true}"#);
        inner.on_dropped();
        inner.on_dropped();

        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert!(!channel.is_ready());
        assert_eq!(
            *statuses.lock(),
            vec![
                ConnectionStatus::Closed,
                ConnectionStatus::Reconnect,
                ConnectionStatus::Closed
            ]
        );
    }

    #[test]
    fn test_shutdown_before_start() {
        let (channel, _hub) = channel();
        channel.shutdown();
        assert_eq!(channel.state(), ConnectionState::Closed);
    }
}

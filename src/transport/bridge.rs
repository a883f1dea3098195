//! Extension bridge transport.
//!
//! Speaks JSON-RPC over a [`MessageChannel`] that has no open/close signal
//! of its own, so endpoint liveness is inferred from a heartbeat.
//!
//! # Event Loop
//!
//! [`EventBridge::start`] spawns one task that:
//!
//! - Sends `<ns>.Ping` every heartbeat interval
//! - Evaluates the round trip `tolerance` after each ping
//! - Settles pending calls from `<ns>.Response`
//! - Relays `<ns>.TransferActivity` and `<ns>.Status` to the hub
//!
//! Losing liveness rejects every pending call with
//! [`Error::ChannelLost`]. Regaining it resubscribes to activity if the
//! caller had subscribed, retrying until accepted.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityHub, ConnectionStatus};
use crate::client::LinkConfig;
use crate::error::{Error, Result};
use crate::identifiers::SubscriberId;
use crate::protocol::{BridgeEvent, BridgeEventKind, RpcRequest, SUBSCRIBE_METHOD};

use super::channel::{BridgeLink, MessageChannel};
use super::liveness::LivenessTracker;
use super::pending::{CallGuard, PendingCalls};

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the event loop.
enum BridgeCommand {
    /// Stop the heartbeat and release pending calls.
    Shutdown,
}

/// Activity subscription bookkeeping.
#[derive(Debug, Default)]
struct Subscription {
    /// The caller asked for activity.
    wanted: bool,
    /// The endpoint accepted the current subscription.
    active: bool,
    /// A resubscribe task is running.
    retrying: bool,
}

/// Receivers consumed by the event loop on start.
struct LoopInputs {
    events: mpsc::UnboundedReceiver<BridgeEvent>,
    commands: mpsc::UnboundedReceiver<BridgeCommand>,
}

// ============================================================================
// EventBridge
// ============================================================================

/// JSON-RPC transport over the extension bridge.
///
/// Cheap to clone; clones share the same channel and registries.
#[derive(Clone)]
pub struct EventBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    namespace: String,
    channel: Arc<dyn MessageChannel>,
    pending: PendingCalls,
    hub: Arc<ActivityHub>,
    tracker: Mutex<LivenessTracker>,
    subscription: Mutex<Subscription>,
    /// Held while a monitor call is outstanding.
    monitor_gate: tokio::sync::Mutex<()>,
    subscriber: SubscriberId,
    heartbeat_interval: Duration,
    resubscribe_interval: Duration,
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    inputs: Mutex<Option<LoopInputs>>,
    closed: AtomicBool,
}

impl EventBridge {
    /// Creates a bridge over `link`. Nothing is sent until [`start`].
    ///
    /// [`start`]: Self::start
    #[must_use]
    pub fn new(config: &LinkConfig, link: BridgeLink, hub: Arc<ActivityHub>) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let BridgeLink { channel, events } = link;

        let inner = BridgeInner {
            namespace: config.namespace.clone(),
            channel,
            pending: PendingCalls::new(config.max_pending),
            hub,
            tracker: Mutex::new(LivenessTracker::new(config.heartbeat_tolerance)),
            subscription: Mutex::new(Subscription::default()),
            monitor_gate: tokio::sync::Mutex::new(()),
            subscriber: SubscriberId::generate(),
            heartbeat_interval: config.heartbeat_interval,
            resubscribe_interval: config.resubscribe_interval,
            command_tx,
            inputs: Mutex::new(Some(LoopInputs {
                events,
                commands: command_rx,
            })),
            closed: AtomicBool::new(false),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Spawns the heartbeat and event loop. Later calls do nothing.
    pub fn start(&self) {
        let Some(inputs) = self.inner.inputs.lock().take() else {
            trace!("Bridge already started");
            return;
        };

        debug!(
            namespace = %self.inner.namespace,
            interval_ms = self.inner.heartbeat_interval.as_millis() as u64,
            tolerance_ms = self.inner.tracker.lock().tolerance().as_millis() as u64,
            "Starting extension bridge"
        );
        tokio::spawn(BridgeInner::run_event_loop(Arc::clone(&self.inner), inputs));
    }

    /// Sends a `<ns>.Request` call and waits for its reply.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotReady`] if the endpoint is not live
    /// - [`Error::ChannelLost`] if liveness is lost while waiting
    /// - [`Error::RemoteRejected`] if the endpoint answers with an error
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.inner.call(BridgeEventKind::Request, method, params).await
    }

    /// Subscribes to transfer activity with `<ns>.Monitor`.
    ///
    /// The subscription is remembered: it is renewed whenever the endpoint
    /// becomes live again. Already active subscriptions are not resent, and
    /// at most one monitor call is outstanding at a time.
    ///
    /// # Errors
    ///
    /// Returns the error of the monitor call. A failed call is retried in
    /// the background.
    pub async fn subscribe_activity(&self) -> Result<()> {
        {
            let mut subscription = self.inner.subscription.lock();
            subscription.wanted = true;
            if subscription.active {
                return Ok(());
            }
        }

        match self.inner.monitor().await {
            Ok(()) => Ok(()),
            Err(e) => {
                BridgeInner::maybe_resubscribe(&self.inner, true);
                Err(e)
            }
        }
    }

    /// Returns `true` while the endpoint answers heartbeats in time.
    #[inline]
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.inner.is_live()
    }

    /// Returns `true` once the endpoint accepted the activity subscription.
    #[inline]
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscription.lock().active
    }

    /// Returns the subscriber id sent with `<ns>.Monitor`.
    #[inline]
    #[must_use]
    pub fn subscriber(&self) -> SubscriberId {
        self.inner.subscriber
    }

    /// Returns the full event name of `kind` in this bridge's namespace.
    #[inline]
    #[must_use]
    pub fn event_name(&self, kind: BridgeEventKind) -> String {
        kind.event_name(&self.inner.namespace)
    }

    /// Returns the number of calls awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Stops the bridge and rejects pending calls. Idempotent.
    pub fn shutdown(&self) {
        self.inner.close();
        let _ = self.inner.command_tx.send(BridgeCommand::Shutdown);
    }
}

impl fmt::Debug for EventBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBridge")
            .field("namespace", &self.inner.namespace)
            .field("live", &self.inner.is_live())
            .field("pending", &self.inner.pending.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// BridgeInner - Calls
// ============================================================================

impl BridgeInner {
    #[inline]
    fn is_live(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.hub.liveness().current()
    }

    async fn call(&self, kind: BridgeEventKind, method: &str, params: Value) -> Result<Value> {
        if !self.is_live() {
            debug!(method, "Bridge endpoint not live, call rejected");
            return Err(Error::ChannelNotReady);
        }

        let (id, rx) = self.pending.register()?;
        let _guard = CallGuard::new(&self.pending, id);

        // Liveness may have dropped between the check and the insert,
        // after the sweep already ran.
        if !self.is_live() {
            return Err(Error::ChannelNotReady);
        }

        let detail = serde_json::to_value(RpcRequest::new(id, method, params))?;
        self.channel.dispatch(BridgeEvent::new(kind, detail))?;
        trace!(%id, method, event = %kind.event_name(&self.namespace), "Bridge call sent");

        rx.await?
    }

    /// Sends `<ns>.Monitor` unless the subscription is already active.
    async fn monitor(&self) -> Result<()> {
        let _gate = self.monitor_gate.lock().await;
        if self.subscription.lock().active {
            trace!("Subscription already active, monitor skipped");
            return Ok(());
        }

        let params = json!([self.subscriber.to_string()]);
        self.call(BridgeEventKind::Monitor, SUBSCRIBE_METHOD, params)
            .await?;

        let mut subscription = self.subscription.lock();
        subscription.active = self.is_live();
        info!(subscriber = %self.subscriber, "Subscribed to transfer activity");
        Ok(())
    }

    /// Starts the resubscribe task unless one is running or none is needed.
    fn maybe_resubscribe(this: &Arc<Self>, wait_first: bool) {
        {
            let mut subscription = this.subscription.lock();
            if !subscription.wanted || subscription.active || subscription.retrying {
                return;
            }
            subscription.retrying = true;
        }

        tokio::spawn(Self::resubscribe_loop(Arc::clone(this), wait_first));
    }

    async fn resubscribe_loop(this: Arc<Self>, mut wait: bool) {
        loop {
            if wait {
                sleep(this.resubscribe_interval).await;
            }
            wait = true;

            {
                let mut subscription = this.subscription.lock();
                if subscription.active || !subscription.wanted {
                    subscription.retrying = false;
                    return;
                }
            }

            if this.is_live()
                && let Err(e) = this.monitor().await
            {
                warn!(error = %e, "Resubscription failed");
            }

            {
                let mut subscription = this.subscription.lock();
                if subscription.active || !subscription.wanted || !this.is_live() {
                    subscription.retrying = false;
                    return;
                }
            }
        }
    }
}

// ============================================================================
// BridgeInner - Event Loop
// ============================================================================

impl BridgeInner {
    async fn run_event_loop(this: Arc<Self>, inputs: LoopInputs) {
        let LoopInputs {
            mut events,
            mut commands,
        } = inputs;

        let mut heartbeat = interval(this.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    deadline = Some(this.tracker.lock().record_ping(Instant::now()));
                    if let Err(e) = this.channel.dispatch(BridgeEvent::new(BridgeEventKind::Ping, json!({}))) {
                        warn!(error = %e, "Failed to send heartbeat");
                    }
                }

                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let verdict = this.tracker.lock().evaluate();
                    if let Some(live) = verdict {
                        Self::apply_liveness(&this, live);
                    }
                }

                event = events.recv() => {
                    match event {
                        Some(event) => Self::handle_event(&this, event),
                        None => {
                            debug!("Bridge event stream ended");
                            break;
                        }
                    }
                }

                command = commands.recv() => {
                    match command {
                        Some(BridgeCommand::Shutdown) | None => {
                            debug!("Bridge shutdown");
                            break;
                        }
                    }
                }
            }
        }

        this.close();
        debug!("Bridge event loop terminated");
    }

    fn handle_event(this: &Arc<Self>, event: BridgeEvent) {
        match event.kind {
            BridgeEventKind::Response => this.handle_response(&event),

            BridgeEventKind::Pong => {
                let verdict = this.tracker.lock().record_pong(Instant::now());
                if verdict == Some(true) {
                    Self::apply_liveness(this, true);
                }
            }

            BridgeEventKind::TransferActivity => {
                let payload = match event.detail {
                    Value::Object(mut detail) if detail.contains_key("result") => {
                        detail.remove("result").unwrap_or(Value::Null)
                    }
                    other => other,
                };
                this.hub.publish_activity(payload);
            }

            BridgeEventKind::Status => {
                let status = event
                    .detail
                    .as_str()
                    .or_else(|| event.detail.get("status").and_then(Value::as_str));

                match status {
                    Some(status) => {
                        this.hub
                            .set_connection(ConnectionStatus::from_agent_status(status));
                    }
                    None => warn!(detail = %event.detail, "Status event without status"),
                }
            }

            kind => trace!(%kind, "Ignoring outbound event kind"),
        }
    }

    fn handle_response(&self, event: &BridgeEvent) {
        let Some(reply) = event.reply() else {
            warn!(detail = %event.detail, "Malformed bridge response");
            return;
        };

        let id = reply.id;
        if !self.pending.settle(reply) {
            self.hub.diagnostics().record_unknown_reply();
            if let Some(id) = id {
                debug!(error = %Error::UnknownReply { id }, "Bridge reply dropped");
            }
        }
    }

    fn apply_liveness(this: &Arc<Self>, live: bool) {
        if this.closed.load(Ordering::Acquire) || !this.hub.set_liveness(live) {
            return;
        }

        if live {
            info!("Bridge endpoint live");
            Self::maybe_resubscribe(this, false);
        } else {
            warn!("Bridge endpoint stopped answering heartbeats");
            this.hub.diagnostics().record_liveness_loss();
            this.subscription.lock().active = false;

            let rejected = this.pending.reject_all(|| Error::ChannelLost);
            if rejected > 0 {
                warn!(rejected, "Rejected pending bridge calls");
            }
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.pending.reject_all(|| Error::ChannelLost);
        self.subscription.lock().active = false;
        self.tracker.lock().reset();
        self.hub.set_liveness(false);
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Agent client facade.
//!
//! The [`AgentClient`] hides which transport is active. Callers issue
//! requests, subscribe to activity and register listeners the same way
//! whether the agent is reached over HTTP or through the extension bridge.
//!
//! # Example
//!
//! ```no_run
//! use agent_link::AgentClient;
//! use serde_json::json;
//!
//! # async fn example() -> agent_link::Result<()> {
//! let client = AgentClient::builder().build()?;
//! client.start();
//!
//! client.register_status_callback(|status| println!("status: {status}"));
//! client.register_activity_callback(|batch| println!("{} updated", batch.len()));
//!
//! let info = client.request("get_info", json!({})).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tracing::{debug, info};

use crate::activity::{ActivityBatch, ActivityHub, ConnectionStatus};
use crate::diagnostics::DiagnosticsSnapshot;
use crate::error::{Error, Result};
use crate::identifiers::RegistrationId;
use crate::transport::{
    BridgeLink, EventBridge, HttpTransport, PushChannel, Transport, TransportKind,
};

use super::builder::ClientBuilder;
use super::options::LinkConfig;

// ============================================================================
// Types
// ============================================================================

/// The constructed transport.
enum Backend {
    /// HTTP calls plus the push channel for activity.
    Http {
        transport: HttpTransport,
        push: PushChannel,
    },
    /// Calls and activity through the extension.
    Bridge(EventBridge),
}

/// Internal shared state for the client.
struct ClientInner {
    backend: Backend,
    hub: Arc<ActivityHub>,
    started: AtomicBool,
}

// ============================================================================
// AgentClient
// ============================================================================

/// Client for the transfer agent.
///
/// Cheap to clone; clones share the transport and listener sets.
#[derive(Clone)]
pub struct AgentClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentClient")
            .field("kind", &self.kind())
            .field("started", &self.inner.started.load(Ordering::Acquire))
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AgentClient - Construction
// ============================================================================

impl AgentClient {
    /// Creates a configuration builder for the client.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn with_http(config: LinkConfig) -> Result<Self> {
        let hub = Arc::new(ActivityHub::new());
        let transport = HttpTransport::new(&config, Arc::clone(&hub))?;
        let push = PushChannel::new(config, Arc::clone(&hub));

        Ok(Self::from_backend(Backend::Http { transport, push }, hub))
    }

    pub(crate) fn with_bridge(config: LinkConfig, link: BridgeLink) -> Self {
        let hub = Arc::new(ActivityHub::new());
        let bridge = EventBridge::new(&config, link, Arc::clone(&hub));

        Self::from_backend(Backend::Bridge(bridge), hub)
    }

    fn from_backend(backend: Backend, hub: Arc<ActivityHub>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                backend,
                hub,
                started: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// AgentClient - Lifecycle
// ============================================================================

impl AgentClient {
    /// Starts push discovery (HTTP) or the heartbeat (bridge).
    ///
    /// Must be called from within a Tokio runtime. Later calls do nothing.
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(kind = %self.kind(), "Starting agent client");
        match &self.inner.backend {
            Backend::Http { push, .. } => push.start(),
            Backend::Bridge(bridge) => bridge.start(),
        }
    }

    /// Stops background work and rejects pending calls.
    pub fn shutdown(&self) {
        debug!(kind = %self.kind(), "Shutting down agent client");
        self.transport().shutdown();

        if let Backend::Http { push, .. } = &self.inner.backend {
            push.shutdown();
        }
    }

    fn transport(&self) -> &dyn Transport {
        match &self.inner.backend {
            Backend::Http { transport, .. } => transport,
            Backend::Bridge(bridge) => bridge,
        }
    }
}

// ============================================================================
// AgentClient - Calls
// ============================================================================

impl AgentClient {
    /// Calls `method` on the agent.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotReady`] before [`start`](Self::start), after
    ///   [`shutdown`](Self::shutdown), or while the extension is not live
    /// - [`Error::RemoteRejected`] if the agent answers with an error
    /// - [`Error::ChannelLost`] if the channel dies while waiting
    /// - [`Error::Http`] / [`Error::Request`] for HTTP failures
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(Error::ChannelNotReady);
        }
        self.transport().request(method, params).await
    }

    /// Subscribes to transfer activity.
    ///
    /// Over HTTP the push channel subscribes on every connect, so this only
    /// checks the client was started. Over the bridge it sends the monitor
    /// call, renewed whenever the extension comes back.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotReady`] before [`start`](Self::start) or after
    ///   [`shutdown`](Self::shutdown)
    /// - Errors of the bridge monitor call
    pub async fn subscribe_activity(&self) -> Result<()> {
        if !self.inner.started.load(Ordering::Acquire) {
            return Err(Error::ChannelNotReady);
        }

        match &self.inner.backend {
            Backend::Http { transport, .. } if transport.is_closed() => {
                Err(Error::ChannelNotReady)
            }
            Backend::Http { .. } => Ok(()),
            Backend::Bridge(bridge) => bridge.subscribe_activity().await,
        }
    }
}

// ============================================================================
// AgentClient - Listeners
// ============================================================================

impl AgentClient {
    /// Registers a listener for updated transfers.
    pub fn register_activity_callback<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&ActivityBatch) + Send + Sync + 'static,
    {
        self.inner.hub.activity().register(listener)
    }

    /// Registers a listener for removed transfers.
    pub fn register_removed_callback<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&ActivityBatch) + Send + Sync + 'static,
    {
        self.inner.hub.removed().register(listener)
    }

    /// Registers a connection-status listener. It is called immediately
    /// with the current status.
    pub fn register_status_callback<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&ConnectionStatus) + Send + Sync + 'static,
    {
        self.inner.hub.connection().register(listener)
    }

    /// Registers a liveness listener. It is called immediately with the
    /// current liveness.
    pub fn register_liveness_callback<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.inner.hub.liveness().register(listener)
    }

    /// Removes an activity listener. Idempotent.
    pub fn deregister_activity_callback(&self, id: RegistrationId) -> bool {
        self.inner.hub.activity().deregister(id)
    }

    /// Removes a removal listener. Idempotent.
    pub fn deregister_removed_callback(&self, id: RegistrationId) -> bool {
        self.inner.hub.removed().deregister(id)
    }

    /// Removes a connection-status listener. Idempotent.
    pub fn deregister_status_callback(&self, id: RegistrationId) -> bool {
        self.inner.hub.connection().deregister(id)
    }

    /// Removes a liveness listener. Idempotent.
    pub fn deregister_liveness_callback(&self, id: RegistrationId) -> bool {
        self.inner.hub.liveness().deregister(id)
    }
}

// ============================================================================
// AgentClient - Accessors
// ============================================================================

impl AgentClient {
    /// Returns the selected transport.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.transport().kind()
    }

    /// Returns `true` when the active channel is usable: push subscription
    /// acknowledged (HTTP) or extension live (bridge).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        match &self.inner.backend {
            Backend::Http { push, .. } => push.is_ready(),
            Backend::Bridge(bridge) => bridge.is_live(),
        }
    }

    /// Returns the current connection status.
    #[inline]
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.hub.connection().current()
    }

    /// Returns a copy of the diagnostics counters.
    #[inline]
    #[must_use]
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.inner.hub.diagnostics().snapshot()
    }

    /// Returns the broadcast hub.
    #[inline]
    #[must_use]
    pub fn hub(&self) -> &Arc<ActivityHub> {
        &self.inner.hub
    }

    /// Returns the push channel when HTTP is selected.
    #[must_use]
    pub fn push_channel(&self) -> Option<&PushChannel> {
        match &self.inner.backend {
            Backend::Http { push, .. } => Some(push),
            Backend::Bridge(_) => None,
        }
    }

    /// Returns the extension bridge when it is selected.
    #[must_use]
    pub fn bridge(&self) -> Option<&EventBridge> {
        match &self.inner.backend {
            Backend::Http { .. } => None,
            Backend::Bridge(bridge) => Some(bridge),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

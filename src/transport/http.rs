//! HTTP JSON-RPC transport.
//!
//! One `POST` per call. Calls are independent: concurrent calls may
//! complete in any order, and each settles with the reply carrying its own
//! correlation id.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, trace, warn};
use url::Url;

use crate::activity::ActivityHub;
use crate::client::LinkConfig;
use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;
use crate::protocol::{RpcReply, RpcRequest};

use super::pending::{CallGuard, PendingCalls};

// ============================================================================
// HttpTransport
// ============================================================================

/// JSON-RPC over HTTP `POST`.
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    pending: PendingCalls,
    hub: Arc<ActivityHub>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Creates a transport posting to the configured endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is not an http(s) URL
    /// - [`Error::Request`] if the HTTP client cannot be built
    pub fn new(config: &LinkConfig, hub: Arc<ActivityHub>) -> Result<Self> {
        let endpoint = config.http_url()?;
        let client = Client::builder().no_proxy().build()?;

        debug!(%endpoint, "HTTP transport ready");
        Ok(Self {
            client,
            endpoint,
            pending: PendingCalls::new(config.max_pending),
            hub,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the endpoint calls are posted to.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the number of calls awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Rejects every call still waiting with [`Error::ChannelLost`] and
    /// refuses later calls. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let rejected = self.pending.reject_all(|| Error::ChannelLost);
        debug!(rejected, "HTTP transport shut down");
    }

    /// Posts `method` with `params` and waits for the reply.
    ///
    /// # Errors
    ///
    /// - [`Error::ChannelNotReady`] after [`shutdown`](Self::shutdown)
    /// - [`Error::Request`] if the request cannot be sent
    /// - [`Error::Http`] on a non-2xx status
    /// - [`Error::RemoteRejected`] if the reply carries an error
    /// - [`Error::Protocol`] if the body answers another call
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            debug!(method, "HTTP transport shut down, call rejected");
            return Err(Error::ChannelNotReady);
        }

        let (id, rx) = self.pending.register()?;
        let _guard = CallGuard::new(&self.pending, id);

        // Shutdown may have swept the registry before the insert.
        if self.is_closed() {
            return Err(Error::ChannelNotReady);
        }

        let envelope = RpcRequest::new(id, method, params);
        trace!(%id, method, "Posting call");

        if let Err(e) = self.exchange(&envelope).await {
            self.pending.reject(id, e);
        }

        // A 2xx body that answered some other id leaves ours pending.
        if self.pending.contains(id) {
            self.pending.reject(
                id,
                Error::protocol(format!("Response did not answer call {id}")),
            );
        }

        rx.await?
    }

    /// Performs the round trip and feeds the reply to the registry.
    async fn exchange(&self, envelope: &RpcRequest) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(envelope)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // reqwest does not expose the server's reason phrase.
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            warn!(id = %envelope.id, status = status.as_u16(), reason, "HTTP call failed");
            return Err(Error::http(status.as_u16(), reason));
        }

        let reply: RpcReply = response.json().await?;
        self.settle(reply);
        Ok(())
    }

    fn settle(&self, reply: RpcReply) {
        let id: Option<CorrelationId> = reply.id;
        if !self.pending.settle(reply) {
            self.hub.diagnostics().record_unknown_reply();
            if let Some(id) = id {
                debug!(error = %Error::UnknownReply { id }, "HTTP reply dropped");
            }
        }
    }
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Pending-call registry.
//!
//! Maps the correlation id of every in-flight call to the channel that
//! settles it. Each entry is removed exactly once: by its reply, by a
//! sweep when the owning channel is lost, or by its [`CallGuard`] when the
//! caller stops waiting.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::{CorrelationCounter, CorrelationId};
use crate::protocol::RpcReply;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum pending calls before rejecting new ones.
pub const DEFAULT_MAX_PENDING: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// Receiving half of a pending call.
pub type CallReceiver = oneshot::Receiver<Result<Value>>;

/// Map of correlation ids to settle channels.
type CorrelationMap = FxHashMap<CorrelationId, oneshot::Sender<Result<Value>>>;

// ============================================================================
// PendingCalls
// ============================================================================

/// Registry of in-flight calls for one channel.
#[derive(Debug)]
pub struct PendingCalls {
    /// Id source. Never yields the subscribe id.
    counter: CorrelationCounter,
    /// In-flight calls.
    calls: Mutex<CorrelationMap>,
    /// Maximum number of in-flight calls.
    max_pending: usize,
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl PendingCalls {
    /// Creates an empty registry accepting up to `max_pending` calls.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            counter: CorrelationCounter::new(),
            calls: Mutex::new(CorrelationMap::default()),
            max_pending,
        }
    }

    /// Registers a new call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if too many calls are pending.
    pub fn register(&self) -> Result<(CorrelationId, CallReceiver)> {
        let mut calls = self.calls.lock();
        if calls.len() >= self.max_pending {
            warn!(
                pending = calls.len(),
                max = self.max_pending,
                "Too many pending calls"
            );
            return Err(Error::protocol(format!(
                "Too many pending calls: {}/{}",
                calls.len(),
                self.max_pending
            )));
        }

        let id = self.counter.next();
        let (tx, rx) = oneshot::channel();
        calls.insert(id, tx);

        trace!(%id, "Call registered");
        Ok((id, rx))
    }

    /// Resolves a call with `value`.
    ///
    /// Returns `false` (and logs) if `id` is not pending.
    pub fn resolve(&self, id: CorrelationId, value: Value) -> bool {
        self.settle_with(id, Ok(value))
    }

    /// Rejects a call with `error`.
    ///
    /// Returns `false` (and logs) if `id` is not pending.
    pub fn reject(&self, id: CorrelationId, error: Error) -> bool {
        self.settle_with(id, Err(error))
    }

    /// Settles the call a reply answers.
    ///
    /// Returns `false` (and logs) if the reply has no id or its id is not
    /// pending. Nothing else is touched in that case.
    pub fn settle(&self, reply: RpcReply) -> bool {
        match reply.id {
            Some(id) => self.settle_with(id, reply.into_result()),
            None => {
                warn!("Reply without id dropped");
                false
            }
        }
    }

    /// Drops a call without settling it.
    ///
    /// Returns `true` if the call was still pending.
    pub fn remove(&self, id: CorrelationId) -> bool {
        let removed = self.calls.lock().remove(&id).is_some();
        if removed {
            debug!(%id, "Abandoned pending call");
        }
        removed
    }

    /// Rejects every pending call, each with its own error from `error`.
    ///
    /// Returns the number of calls rejected.
    pub fn reject_all(&self, error: impl Fn() -> Error) -> usize {
        let pending: Vec<_> = self.calls.lock().drain().collect();
        let count = pending.len();

        for (_, tx) in pending {
            let _ = tx.send(Err(error()));
        }

        if count > 0 {
            debug!(count, "Rejected pending calls");
        }
        count
    }

    /// Returns `true` if `id` is pending.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: CorrelationId) -> bool {
        self.calls.lock().contains_key(&id)
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns `true` if no call is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    fn settle_with(&self, id: CorrelationId, outcome: Result<Value>) -> bool {
        let tx = self.calls.lock().remove(&id);

        match tx {
            Some(tx) => {
                // Receiver may already be gone; the entry is removed either way.
                let _ = tx.send(outcome);
                trace!(%id, "Call settled");
                true
            }
            None => {
                warn!(%id, "Reply for unknown call");
                false
            }
        }
    }
}

// ============================================================================
// CallGuard
// ============================================================================

/// Removes a call from its registry when the waiting future is dropped.
///
/// Harmless after the call has settled.
pub(crate) struct CallGuard<'a> {
    pending: &'a PendingCalls,
    id: CorrelationId,
}

impl<'a> CallGuard<'a> {
    #[inline]
    pub(crate) fn new(pending: &'a PendingCalls, id: CorrelationId) -> Self {
        Self { pending, id }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.pending.calls.lock().remove(&self.id);
    }
}

// ============================================================================
// Tests
// ============================================================================

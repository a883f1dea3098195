//! Listener registry for one event class.
//!
//! Listeners are snapshotted before they are invoked, so a listener may
//! register or deregister (itself or others) from inside its callback.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RegistrationId;

// ============================================================================
// Types
// ============================================================================

/// Listener callback for events of type `T`.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

// ============================================================================
// CallbackRegistry
// ============================================================================

/// Set of independently registered listeners for one event class.
pub struct CallbackRegistry<T> {
    /// Event class name, for logs.
    name: &'static str,
    /// Next registration id. Never reused.
    next_id: AtomicU64,
    /// Listeners in registration order.
    listeners: Mutex<Vec<(RegistrationId, Listener<T>)>>,
}

impl<T> CallbackRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Registers a listener.
    pub fn register<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.insert(Arc::new(listener))
    }

    /// Registers a listener that may be absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidListener`] (after logging) when `listener`
    /// is `None`; nothing is registered.
    pub fn try_register(&self, listener: Option<Listener<T>>) -> Result<RegistrationId> {
        match listener {
            Some(listener) => Ok(self.insert(listener)),
            None => {
                warn!(registry = self.name, "Rejected non-callable listener");
                Err(Error::InvalidListener)
            }
        }
    }

    /// Removes a listener.
    ///
    /// Returns `false` for unknown or already removed ids.
    pub fn deregister(&self, id: RegistrationId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        let removed = listeners.len() != before;

        trace!(registry = self.name, %id, removed, "Listener deregistered");
        removed
    }

    /// Invokes every listener with `event`.
    ///
    /// Listeners registered during this call are not invoked for this event.
    pub fn emit(&self, event: &T) {
        for (_, listener) in self.snapshot() {
            listener(event);
        }
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Returns `true` if no listener is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    pub(crate) fn insert(&self, listener: Listener<T>) -> RegistrationId {
        let id = RegistrationId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, listener));

        trace!(registry = self.name, %id, "Listener registered");
        id
    }

    fn snapshot(&self) -> Vec<(RegistrationId, Listener<T>)> {
        self.listeners.lock().clone()
    }
}

impl<T> fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("name", &self.name)
            .field("listeners", &self.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

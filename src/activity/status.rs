//! Status cells with duplicate suppression.
//!
//! A [`StatusCell`] holds the current value of one status class
//! (connection status, endpoint liveness). New listeners are called once
//! with the current value as soon as they register; afterwards they are
//! called only when the value actually changes.
//!
//! A listener may call [`StatusCell::set`] from inside its callback. The
//! nested value is queued and delivered after the running notification
//! reaches every listener, so each listener observes changes in order and
//! its last observation matches [`StatusCell::current`].

// ============================================================================
// Imports
// ============================================================================

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::Result;
use crate::identifiers::RegistrationId;

use super::registry::{CallbackRegistry, Listener};

// ============================================================================
// ConnectionStatus
// ============================================================================

/// Externally visible status of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    /// Not connected. Initial value.
    Closed,
    /// Connected and subscribed.
    Reconnect,
}

impl ConnectionStatus {
    /// Maps a status string reported by the agent through the extension.
    ///
    /// `"running"` (any case) means reachable; anything else is closed.
    #[must_use]
    pub fn from_agent_status(status: &str) -> Self {
        if status.eq_ignore_ascii_case("running") {
            Self::Reconnect
        } else {
            Self::Closed
        }
    }

    /// Returns the wire name (`"CLOSED"` / `"RECONNECT"`).
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Reconnect => "RECONNECT",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// StatusCell
// ============================================================================

/// Current value of a status class plus its listeners.
pub struct StatusCell<S> {
    /// Current value.
    current: Mutex<S>,
    /// Registered listeners.
    listeners: CallbackRegistry<S>,
    /// Serializes notifications. Re-entrant so a listener may call `set`.
    /// Holds `true` while listeners are being notified.
    notify: ReentrantMutex<Cell<bool>>,
    /// Values set by listeners during a notification.
    queued: Mutex<VecDeque<S>>,
}

impl<S> StatusCell<S>
where
    S: Clone + PartialEq + fmt::Debug,
{
    /// Creates a cell holding `initial`.
    #[must_use]
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            current: Mutex::new(initial),
            listeners: CallbackRegistry::new(name),
            notify: ReentrantMutex::new(Cell::new(false)),
            queued: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the current value.
    #[inline]
    #[must_use]
    pub fn current(&self) -> S {
        self.current.lock().clone()
    }

    /// Stores `value` and notifies listeners if it differs from the
    /// current one.
    ///
    /// Returns `true` if the value changed. A change made from inside a
    /// listener is delivered once the current notification completes.
    pub fn set(&self, value: S) -> bool {
        let notifying = self.notify.lock();

        {
            let mut current = self.current.lock();
            if *current == value {
                trace!(status = ?value, "Status unchanged");
                return false;
            }
            *current = value.clone();
        }

        debug!(status = ?value, "Status changed");

        if notifying.get() {
            trace!(status = ?value, "Status queued behind running notification");
            self.queued.lock().push_back(value);
            return true;
        }

        let _emitting = EmitGuard::enter(&notifying);
        let mut next = Some(value);
        while let Some(value) = next {
            self.listeners.emit(&value);
            next = self.queued.lock().pop_front();
        }
        true
    }

    /// Registers a listener and calls it with the current value.
    pub fn register<F>(&self, listener: F) -> RegistrationId
    where
        F: Fn(&S) + Send + Sync + 'static,
    {
        let _notify = self.notify.lock();
        let listener: Listener<S> = Arc::new(listener);
        let id = self.listeners.insert(Arc::clone(&listener));

        let current = self.current();
        listener(&current);
        id
    }

    /// Registers a listener that may be absent.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidListener`] when `listener` is `None`.
    pub fn try_register(&self, listener: Option<Listener<S>>) -> Result<RegistrationId> {
        let _notify = self.notify.lock();
        let id = self.listeners.try_register(listener.clone())?;

        if let Some(listener) = listener {
            let current = self.current();
            listener(&current);
        }
        Ok(id)
    }

    /// Removes a listener. Idempotent.
    #[inline]
    pub fn deregister(&self, id: RegistrationId) -> bool {
        self.listeners.deregister(id)
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Marks a notification as running until dropped.
struct EmitGuard<'a>(&'a Cell<bool>);

impl<'a> EmitGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for EmitGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<S: fmt::Debug> fmt::Debug for StatusCell<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusCell")
            .field("current", &*self.current.lock())
            .field("listeners", &self.listeners)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder<S: Clone + Send + 'static>() -> (Arc<Mutex<Vec<S>>>, impl Fn(&S) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |value: &S| sink.lock().push(value.clone()))
    }

    #[test]
    fn test_register_reports_current_state() {
        let cell = StatusCell::new("connection", ConnectionStatus::Closed);
        let (seen, listener) = recorder();

        cell.register(listener);

        assert_eq!(*seen.lock(), vec![ConnectionStatus::Closed]);
    }

    #[test]
    fn test_repeated_values_notify_once() {
        let cell = StatusCell::new("connection", ConnectionStatus::Reconnect);
        let (seen, listener) = recorder();
        cell.register(listener);

        assert!(cell.set(ConnectionStatus::Closed));
        assert!(!cell.set(ConnectionStatus::Closed));
        assert!(cell.set(ConnectionStatus::Reconnect));
        assert!(!cell.set(ConnectionStatus::Reconnect));

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionStatus::Reconnect,
                ConnectionStatus::Closed,
                ConnectionStatus::Reconnect
            ]
        );
    }

    #[test]
    fn test_liveness_cell() {
        let cell = StatusCell::new("liveness", false);
        let (seen, listener) = recorder();
        cell.register(listener);

        cell.set(true);
        cell.set(true);
        cell.set(false);

        assert_eq!(*seen.lock(), vec![false, true, false]);
        assert!(!cell.current());
    }

    #[test]
    fn test_deregistered_listener_is_silent() {
        let cell = StatusCell::new("liveness", false);
        let (seen, listener) = recorder();
        let id = cell.register(listener);

        assert!(cell.deregister(id));
        assert!(!cell.deregister(id));
        cell.set(true);

        assert_eq!(*seen.lock(), vec![false]);
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn test_try_register_none() {
        let cell = StatusCell::new("liveness", false);
        assert!(cell.try_register(None).is_err());
        assert_eq!(cell.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_set_from_callback() {
        let cell = Arc::new(StatusCell::new("liveness", false));
        let inner = Arc::clone(&cell);
        cell.register(move |value: &bool| {
            if *value {
                inner.set(false);
            }
        });

        cell.set(true);
        assert!(!cell.current());
    }

    #[test]
    fn test_nested_set_reaches_later_listeners_last() {
        let cell = Arc::new(StatusCell::new("connection", ConnectionStatus::Closed));

        let inner = Arc::clone(&cell);
        cell.register(move |status: &ConnectionStatus| {
            if *status == ConnectionStatus::Reconnect {
                inner.set(ConnectionStatus::Closed);
            }
        });
        let (seen, listener) = recorder();
        cell.register(listener);

        assert!(cell.set(ConnectionStatus::Reconnect));

        assert_eq!(
            *seen.lock(),
            vec![
                ConnectionStatus::Closed,
                ConnectionStatus::Reconnect,
                ConnectionStatus::Closed
            ]
        );
        assert_eq!(seen.lock().last().copied(), Some(cell.current()));
    }

    #[test]
    fn test_agent_status_mapping() {
        assert_eq!(
            ConnectionStatus::from_agent_status("RUNNING"),
            ConnectionStatus::Reconnect
        );
        assert_eq!(
            ConnectionStatus::from_agent_status("stopped"),
            ConnectionStatus::Closed
        );
        assert_eq!(ConnectionStatus::Closed.to_string(), "CLOSED");
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Reconnect).expect("serialize"),
            "\"RECONNECT\""
        );
    }
}

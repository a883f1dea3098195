//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids, listener registration ids and
//! subscriber ids from being mixed up at compile time.
//!
//! | Type | Scope | Source |
//! |------|-------|--------|
//! | [`CorrelationId`] | One outgoing call | Per-registry counter |
//! | [`RegistrationId`] | One listener | Per-registry counter |
//! | [`SubscriberId`] | One client instance | Random UUID |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// CorrelationId
// ============================================================================

/// Token pairing one outgoing call with its eventual reply.
///
/// Serialized as a bare JSON number, matching the JSON-RPC `id` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Reserved id of the push-channel subscription handshake.
    ///
    /// Never minted by [`CorrelationCounter`].
    pub const SUBSCRIBE: Self = Self(1);

    /// First id handed out for ordinary calls.
    pub const FIRST_CALL: Self = Self(2);

    /// Wraps a raw id.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved subscription handshake id.
    #[inline]
    #[must_use]
    pub const fn is_subscribe(&self) -> bool {
        self.0 == Self::SUBSCRIBE.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CorrelationCounter
// ============================================================================

/// Monotonic source of [`CorrelationId`]s for one channel.
///
/// Starts at [`CorrelationId::FIRST_CALL`] so the handshake id is never
/// reused for an ordinary call.
#[derive(Debug)]
pub struct CorrelationCounter(AtomicU64);

impl CorrelationCounter {
    /// Creates a counter positioned at the first call id.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(CorrelationId::FIRST_CALL.0))
    }

    /// Mints the next id.
    #[inline]
    pub fn next(&self) -> CorrelationId {
        CorrelationId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for CorrelationCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// RegistrationId
// ============================================================================

/// Handle returned when a listener is registered.
///
/// Unique for the lifetime of the registry that issued it, so passing it
/// to `deregister` is unambiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    #[inline]
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

// ============================================================================
// SubscriberId
// ============================================================================

/// Identity this client presents when subscribing to transfer activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generates a fresh random subscriber id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Link configuration and runtime environment.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use agent_link::LinkConfig;
//!
//! let config = LinkConfig::new()
//!     .with_http_endpoint("http://127.0.0.1:33003/rpc")
//!     .with_ports(33024, 33029)
//!     .with_reconnect_backoff(Duration::from_secs(1));
//!
//! config.validate()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::ops::RangeInclusive;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::pending::DEFAULT_MAX_PENDING;

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP JSON-RPC endpoint of the agent.
pub const DEFAULT_HTTP_ENDPOINT: &str = "http://127.0.0.1:33003/rpc";

/// Default host probed for the push channel.
pub const DEFAULT_PUSH_HOST: &str = "127.0.0.1";

/// Default first port of the push-channel range.
pub const DEFAULT_FIRST_PORT: u16 = 33024;

/// Default last port of the push-channel range.
pub const DEFAULT_LAST_PORT: u16 = 33029;

/// Default event namespace of the extension bridge.
pub const DEFAULT_NAMESPACE: &str = "TransferAgent";

/// Environment variable consulted by [`Environment::from_env`].
pub const TRANSPORT_ENV_VAR: &str = "AGENT_LINK_TRANSPORT";

// ============================================================================
// LinkConfig
// ============================================================================

/// Endpoints and timings of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    /// HTTP JSON-RPC endpoint.
    pub http_endpoint: String,

    /// Host probed for the push channel.
    pub push_host: String,

    /// First port of the push-channel range (inclusive).
    pub first_port: u16,

    /// Last port of the push-channel range (inclusive).
    pub last_port: u16,

    /// Delay before a new discovery cycle.
    pub reconnect_backoff: Duration,

    /// Upper bound for opening one port.
    pub probe_timeout: Duration,

    /// Upper bound for the subscription acknowledgement.
    pub handshake_timeout: Duration,

    /// Event-name namespace of the extension bridge.
    pub namespace: String,

    /// Heartbeat period of the extension bridge.
    pub heartbeat_interval: Duration,

    /// Maximum heartbeat round trip still considered live.
    pub heartbeat_tolerance: Duration,

    /// Delay between failed resubscription attempts.
    pub resubscribe_interval: Duration,

    /// Maximum in-flight calls per channel.
    pub max_pending: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl LinkConfig {
    /// Creates a configuration with the default endpoints and timings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http_endpoint: DEFAULT_HTTP_ENDPOINT.to_string(),
            push_host: DEFAULT_PUSH_HOST.to_string(),
            first_port: DEFAULT_FIRST_PORT,
            last_port: DEFAULT_LAST_PORT,
            reconnect_backoff: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(10),
            namespace: DEFAULT_NAMESPACE.to_string(),
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_tolerance: Duration::from_millis(500),
            resubscribe_interval: Duration::from_secs(1),
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl LinkConfig {
    /// Sets the HTTP JSON-RPC endpoint.
    #[inline]
    #[must_use]
    pub fn with_http_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.http_endpoint = endpoint.into();
        self
    }

    /// Sets the host probed for the push channel.
    #[inline]
    #[must_use]
    pub fn with_push_host(mut self, host: impl Into<String>) -> Self {
        self.push_host = host.into();
        self
    }

    /// Sets the inclusive push-channel port range.
    #[inline]
    #[must_use]
    pub fn with_ports(mut self, first: u16, last: u16) -> Self {
        self.first_port = first;
        self.last_port = last;
        self
    }

    /// Sets the delay between discovery cycles.
    #[inline]
    #[must_use]
    pub fn with_reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.reconnect_backoff = backoff;
        self
    }

    /// Sets the per-port open timeout.
    #[inline]
    #[must_use]
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Sets the subscription acknowledgement timeout.
    #[inline]
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the extension bridge namespace.
    #[inline]
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the heartbeat period.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat round-trip tolerance.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_tolerance(mut self, tolerance: Duration) -> Self {
        self.heartbeat_tolerance = tolerance;
        self
    }

    /// Sets the resubscription retry delay.
    #[inline]
    #[must_use]
    pub fn with_resubscribe_interval(mut self, interval: Duration) -> Self {
        self.resubscribe_interval = interval;
        self
    }

    /// Sets the maximum in-flight calls per channel.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

// ============================================================================
// Accessors & Validation
// ============================================================================

impl LinkConfig {
    /// Returns the push-channel port range.
    #[inline]
    #[must_use]
    pub fn ports(&self) -> RangeInclusive<u16> {
        self.first_port..=self.last_port
    }

    /// Returns the WebSocket URL probed on `port`.
    #[inline]
    #[must_use]
    pub fn push_url(&self, port: u16) -> String {
        format!("ws://{}:{port}", self.push_host)
    }

    /// Parses the HTTP endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] unless the endpoint is an http(s) URL.
    pub fn http_url(&self) -> Result<Url> {
        let url = Url::parse(&self.http_endpoint)
            .map_err(|e| Error::config(format!("Invalid HTTP endpoint {}: {e}", self.http_endpoint)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(Error::config(format!(
                "HTTP endpoint must use http or https, got {other}"
            ))),
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        self.http_url()?;

        if self.push_host.trim().is_empty() {
            return Err(Error::config("Push host must not be empty"));
        }
        if self.first_port == 0 || self.first_port > self.last_port {
            return Err(Error::config(format!(
                "Invalid port range {}..={}",
                self.first_port, self.last_port
            )));
        }
        if self.namespace.is_empty() || self.namespace.contains('.') {
            return Err(Error::config(format!(
                "Invalid bridge namespace {:?}",
                self.namespace
            )));
        }

        for (name, value) in [
            ("reconnect_backoff", self.reconnect_backoff),
            ("probe_timeout", self.probe_timeout),
            ("handshake_timeout", self.handshake_timeout),
            ("heartbeat_interval", self.heartbeat_interval),
            ("heartbeat_tolerance", self.heartbeat_tolerance),
            ("resubscribe_interval", self.resubscribe_interval),
        ] {
            if value.is_zero() {
                return Err(Error::config(format!("{name} must be greater than zero")));
            }
        }

        if self.heartbeat_tolerance >= self.heartbeat_interval {
            return Err(Error::config(
                "heartbeat_tolerance must be shorter than heartbeat_interval",
            ));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be greater than zero"));
        }

        Ok(())
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Runtime facts the transport selector decides on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Environment {
    /// The host can only reach the agent through the extension bridge.
    pub extension_bridge: bool,
}

impl Environment {
    /// Creates an environment with no extension bridge.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            extension_bridge: false,
        }
    }

    /// Marks the extension bridge as the only channel.
    #[inline]
    #[must_use]
    pub const fn with_extension_bridge(mut self, available: bool) -> Self {
        self.extension_bridge = available;
        self
    }

    /// Detects the environment from [`TRANSPORT_ENV_VAR`].
    ///
    /// `bridge` (any case) selects the extension bridge; anything else,
    /// or an unset variable, selects HTTP.
    #[must_use]
    pub fn from_env() -> Self {
        let extension_bridge = env::var(TRANSPORT_ENV_VAR)
            .map(|value| value.trim().eq_ignore_ascii_case("bridge"))
            .unwrap_or(false);

        Self { extension_bridge }
    }
}

// ============================================================================
// Tests
// ============================================================================

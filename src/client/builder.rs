//! Builder pattern for client configuration.
//!
//! # Example
//!
//! ```no_run
//! use agent_link::{AgentClient, Environment, LinkConfig};
//!
//! # fn example() -> agent_link::Result<()> {
//! let client = AgentClient::builder()
//!     .config(LinkConfig::new().with_ports(33024, 33029))
//!     .environment(Environment::new())
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use tracing::warn;

use crate::error::{Error, Result};
use crate::transport::{BridgeLink, TransportKind};

use super::core::AgentClient;
use super::options::{Environment, LinkConfig};
use super::selector::select_transport;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for an [`AgentClient`].
///
/// Use [`AgentClient::builder()`] to create one.
#[derive(Debug, Default)]
pub struct ClientBuilder {
    /// Endpoints and timings.
    config: LinkConfig,
    /// Runtime environment. Detected from the process when unset.
    environment: Option<Environment>,
    /// Channel to the extension, required for the bridge transport.
    link: Option<BridgeLink>,
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a builder with the default configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the link configuration.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: LinkConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the runtime environment instead of detecting it.
    #[inline]
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Sets the extension channel used by the bridge transport.
    #[inline]
    #[must_use]
    pub fn bridge_link(mut self, link: BridgeLink) -> Self {
        self.link = Some(link);
        self
    }

    /// Validates the configuration and builds the client.
    ///
    /// Only the selected transport is constructed. Nothing is started.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::Config`] if the bridge is selected without a link
    pub fn build(self) -> Result<AgentClient> {
        self.config.validate()?;

        let environment = self.environment.unwrap_or_else(Environment::from_env);
        let kind = select_transport(environment);

        match (kind, self.link) {
            (TransportKind::EventBridge, None) => Err(Error::config(
                "The extension bridge is selected but no link was given.\n\
                 Use .bridge_link() to provide the extension channel.",
            )),
            (TransportKind::EventBridge, Some(link)) => {
                Ok(AgentClient::with_bridge(self.config, link))
            }
            (TransportKind::Http, link) => {
                if link.is_some() {
                    warn!("Bridge link ignored: HTTP transport selected");
                }
                AgentClient::with_http(self.config)
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

    use crate::transport::MemoryChannel;

    #[test]
    fn test_builds_http_client() {
        let client = ClientBuilder::new()
            .environment(Environment::new())
            .build()
            .expect("build");
        assert_eq!(client.kind(), TransportKind::Http);
        assert!(client.push_channel().is_some());
        assert!(client.bridge().is_none());
    }

    #[test]
    fn test_builds_bridge_client() {
        let (link, _endpoint) = MemoryChannel::pair();
        let client = ClientBuilder::new()
            .environment(Environment::new().with_extension_bridge(true))
            .bridge_link(link)
            .build()
            .expect("build");
        assert_eq!(client.kind(), TransportKind::EventBridge);
        assert!(client.push_channel().is_none());
        assert!(client.bridge().is_some());
    }

    #[test]
    fn test_bridge_requires_link() {
        let err = ClientBuilder::new()
            .environment(Environment::new().with_extension_bridge(true))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("bridge_link"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ClientBuilder::new()
            .config(LinkConfig::new().with_ports(2, 1))
            .environment(Environment::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}

//! Client facade and configuration.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent [`ClientBuilder`] |
//! | `core` | [`AgentClient`] facade |
//! | `options` | [`LinkConfig`] and [`Environment`] |
//! | `selector` | Transport selection |

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for client configuration.
pub mod builder;

/// Agent client facade.
pub mod core;

/// Link configuration and runtime environment.
pub mod options;

/// Transport selection.
pub mod selector;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use self::core::AgentClient;
pub use options::{
    DEFAULT_FIRST_PORT, DEFAULT_HTTP_ENDPOINT, DEFAULT_LAST_PORT, DEFAULT_NAMESPACE,
    DEFAULT_PUSH_HOST, Environment, LinkConfig, TRANSPORT_ENV_VAR,
};
pub use selector::select_transport;

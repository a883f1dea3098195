//! Transport selection.
//!
//! Decided once, when the client is built. The strategy that is not
//! selected is never constructed.

use tracing::debug;

use crate::transport::TransportKind;

use super::options::Environment;

/// Picks the transport for `environment`.
///
/// The extension bridge is used only when it is the sole channel to the
/// agent; everything else talks HTTP.
#[must_use]
pub fn select_transport(environment: Environment) -> TransportKind {
    let kind = if environment.extension_bridge {
        TransportKind::EventBridge
    } else {
        TransportKind::Http
    };

    debug!(%kind, ?environment, "Transport selected");
    kind
}

//! Push messages and bridge events.
//!
//! Push messages arrive unsolicited over the WebSocket push channel.
//! Bridge events are the custom events exchanged with a browser extension.
//!
//! # Bridge Event Names
//!
//! | Direction | Names |
//! |-----------|-------|
//! | Outbound | `<ns>.Request`, `<ns>.Ping`, `<ns>.Monitor` |
//! | Inbound | `<ns>.Response`, `<ns>.Pong`, `<ns>.TransferActivity`, `<ns>.Status` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::identifiers::CorrelationId;

use super::RpcReply;

// ============================================================================
// Topics
// ============================================================================

/// Push topic carrying updated transfer records.
pub const TOPIC_TRANSFER_ACTIVITY: &str = "transfer_activity";

/// Push topic carrying removed transfer records.
pub const TOPIC_TRANSFERS_REMOVED: &str = "transfers_removed";

// ============================================================================
// PushMessage
// ============================================================================

/// A message received on the push channel.
///
/// # Format
///
/// ```json
/// {
///   "id": 17,
///   "method": "transfer_activity",
///   "params": { "result": [ ... ] }
/// }
/// ```
///
/// A message whose `id` is the reserved subscribe id is the handshake
/// acknowledgement, whatever else it carries.
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    /// Message id.
    #[serde(default)]
    pub id: Option<CorrelationId>,

    /// Topic name.
    #[serde(default)]
    pub method: Option<String>,

    /// Topic params, normally `{"result": payload}`.
    #[serde(default)]
    pub params: Option<Value>,

    /// Result member of a handshake acknowledgement.
    #[serde(default)]
    pub result: Option<Value>,

    /// Error member of a handshake acknowledgement.
    #[serde(default)]
    pub error: Option<Value>,
}

/// Classified push message.
#[derive(Debug, Clone, PartialEq)]
pub enum PushKind {
    /// Acknowledgement of the subscription handshake.
    HandshakeAck(RpcReply),

    /// Topic message.
    Topic {
        /// Topic name.
        topic: String,
        /// Unwrapped `params.result` (or `params` when not wrapped).
        payload: Value,
    },

    /// Neither a handshake reply nor a topic message.
    Unrecognized,
}

impl PushMessage {
    /// Classifies the message.
    #[must_use]
    pub fn classify(self) -> PushKind {
        if self.id.is_some_and(|id| id.is_subscribe()) {
            return PushKind::HandshakeAck(RpcReply {
                id: self.id,
                result: self.result,
                error: self.error,
            });
        }

        match self.method {
            Some(topic) => {
                let payload = match self.params {
                    Some(Value::Object(mut params)) if params.contains_key("result") => {
                        params.remove("result").unwrap_or(Value::Null)
                    }
                    Some(other) => other,
                    None => Value::Null,
                };
                PushKind::Topic { topic, payload }
            }
            None => PushKind::Unrecognized,
        }
    }
}

// ============================================================================
// BridgeEventKind
// ============================================================================

/// Kinds of custom events on the extension bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEventKind {
    /// Outbound correlated call.
    Request,
    /// Outbound heartbeat.
    Ping,
    /// Outbound activity subscription.
    Monitor,
    /// Inbound reply, keyed by envelope id.
    Response,
    /// Inbound heartbeat acknowledgement.
    Pong,
    /// Inbound transfer activity batch.
    TransferActivity,
    /// Inbound agent status report.
    Status,
}

impl BridgeEventKind {
    /// All kinds, outbound first.
    pub const ALL: [Self; 7] = [
        Self::Request,
        Self::Ping,
        Self::Monitor,
        Self::Response,
        Self::Pong,
        Self::TransferActivity,
        Self::Status,
    ];

    /// Returns the event suffix.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::Ping => "Ping",
            Self::Monitor => "Monitor",
            Self::Response => "Response",
            Self::Pong => "Pong",
            Self::TransferActivity => "TransferActivity",
            Self::Status => "Status",
        }
    }

    /// Returns `true` for events sent by this side.
    #[inline]
    #[must_use]
    pub const fn is_outbound(&self) -> bool {
        matches!(self, Self::Request | Self::Ping | Self::Monitor)
    }

    /// Returns the full event name under `namespace`.
    #[inline]
    #[must_use]
    pub fn event_name(&self, namespace: &str) -> String {
        format!("{namespace}.{}", self.as_str())
    }

    /// Parses a full event name under `namespace`.
    #[must_use]
    pub fn from_event_name(namespace: &str, name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(namespace)?.strip_prefix('.')?;
        Self::ALL.into_iter().find(|kind| kind.as_str() == suffix)
    }
}

impl fmt::Display for BridgeEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// BridgeEvent
// ============================================================================

/// A custom event crossing the extension bridge.
///
/// `detail` is the event payload: a JSON-RPC envelope for `Request`,
/// `Monitor` and `Response`, free-form for the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeEvent {
    /// Event kind.
    pub kind: BridgeEventKind,

    /// Event detail.
    pub detail: Value,
}

impl BridgeEvent {
    /// Creates an event of `kind` with `detail`.
    #[inline]
    #[must_use]
    pub fn new(kind: BridgeEventKind, detail: Value) -> Self {
        Self { kind, detail }
    }

    /// Parses the detail as a reply envelope.
    #[must_use]
    pub fn reply(&self) -> Option<RpcReply> {
        serde_json::from_value(self.detail.clone()).ok()
    }

    /// Returns the correlation id of the envelope in `detail`, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        self.detail
            .get("id")
            .cloned()
            .and_then(|id| serde_json::from_value(id).ok())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_push_topic_unwraps_result() {
        let message: PushMessage = serde_json::from_str(
            r#"{"id": 9, "method": "transfer_activity", "params": {"result": [{"uuid": "a"}]}}"#,
        )
        .expect("parse");

        match message.classify() {
            PushKind::Topic { topic, payload } => {
                assert_eq!(topic, TOPIC_TRANSFER_ACTIVITY);
                assert_eq!(payload, json!([{"uuid": "a"}]));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_push_handshake_ack() {
        let message: PushMessage =
            serde_json::from_str(r#"{"id": 1, "result": "subscribed"}"#).expect("parse");

        match message.classify() {
            PushKind::HandshakeAck(reply) => {
                assert_eq!(reply.into_result().expect("ok"), json!("subscribed"));
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn test_push_with_id_one_is_never_a_topic() {
        let message: PushMessage = serde_json::from_str(
            r#"{"id": 1, "method": "transfer_activity", "params": {"result": []}}"#,
        )
        .expect("parse");

        assert!(matches!(message.classify(), PushKind::HandshakeAck(_)));
    }

    #[test]
    fn test_push_unrecognized() {
        let message: PushMessage = serde_json::from_str(r#"{"id": 4}"#).expect("parse");
        assert_eq!(message.classify(), PushKind::Unrecognized);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(
            BridgeEventKind::Request.event_name("TransferAgent"),
            "TransferAgent.Request"
        );
        assert_eq!(
            BridgeEventKind::from_event_name("TransferAgent", "TransferAgent.Pong"),
            Some(BridgeEventKind::Pong)
        );
        assert_eq!(
            BridgeEventKind::from_event_name("TransferAgent", "Other.Pong"),
            None
        );
        assert_eq!(
            BridgeEventKind::from_event_name("TransferAgent", "TransferAgentPong"),
            None
        );
    }

    #[test]
    fn test_outbound_kinds() {
        let outbound: Vec<_> = BridgeEventKind::ALL
            .into_iter()
            .filter(BridgeEventKind::is_outbound)
            .collect();
        assert_eq!(
            outbound,
            vec![
                BridgeEventKind::Request,
                BridgeEventKind::Ping,
                BridgeEventKind::Monitor
            ]
        );
    }

    #[test]
    fn test_bridge_event_correlation_id() {
        let event = BridgeEvent::new(BridgeEventKind::Response, json!({"id": 12, "result": 1}));
        assert_eq!(event.correlation_id(), Some(CorrelationId::new(12)));
        assert_eq!(event.reply().and_then(|r| r.id), Some(CorrelationId::new(12)));
    }
}

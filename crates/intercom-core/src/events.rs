//! Realtime events emitted by the orchestrator.
//!
//! Events are fired only after a persistence success, through the
//! [`EventSink`](crate::ports::EventSink) port. Delivery is best-effort,
//! at-least-once; the core requires no guarantee from the sink.

use crate::call::EndReason;
use serde::{Deserialize, Serialize};

/// A call lifecycle event, serialized with a `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    /// Sent to the callee when a call is offered to them.
    #[serde(rename_all = "camelCase")]
    CallIncoming {
        call_id: String,
        caller_id: String,
        caller_name: String,
    },
    /// Broadcast the instant a call transitions to `active`.
    #[serde(rename_all = "camelCase")]
    CallStarted { call_id: String },
    /// Sent to the other participant and broadcast when a call ends.
    #[serde(rename_all = "camelCase")]
    CallEnded {
        call_id: String,
        ended_by: String,
        end_reason: EndReason,
    },
}

impl CallEvent {
    /// The wire name of this event's type, for logging and metrics labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::CallIncoming { .. } => "call_incoming",
            CallEvent::CallStarted { .. } => "call_started",
            CallEvent::CallEnded { .. } => "call_ended",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incoming_wire_format() {
        let event = CallEvent::CallIncoming {
            call_id: "call_123".into(),
            caller_id: "client1".into(),
            caller_name: "Alice".into(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call_incoming");
        assert_eq!(json["callId"], "call_123");
        assert_eq!(json["callerName"], "Alice");
    }

    #[test]
    fn test_ended_wire_format() {
        let event = CallEvent::CallEnded {
            call_id: "call_123".into(),
            ended_by: "client1".into(),
            end_reason: EndReason::CallerHangup,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call_ended");
        assert_eq!(json["endedBy"], "client1");
        assert_eq!(json["endReason"], "caller_hangup");
    }

    #[test]
    fn test_event_names() {
        let event = CallEvent::CallStarted {
            call_id: "c".into(),
        };
        assert_eq!(event.name(), "call_started");
    }
}

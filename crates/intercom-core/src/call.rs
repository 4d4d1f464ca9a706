//! The call document and its state machine vocabulary.
//!
//! A call is a directed session between exactly two participants. The
//! document records an identity snapshot taken at creation, the media-bridge
//! resources backing the session, and the signaling progress of each side.
//! State is monotonic: `offering` -> `active` -> `ended`, and `ended` is
//! terminal. A call document is never deleted; it remains as a historical
//! record of the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Created, waiting for both sides to finish signaling.
    Offering,
    /// Both participants are ready; media is flowing.
    Active,
    /// Terminal. Exactly one `ended_by`/`end_reason` pair was recorded.
    Ended,
}

/// Why a call reached `ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    CallerHangup,
    CalleeHangup,
    CallerDisconnected,
    CalleeDisconnected,
    Timeout,
}

impl EndReason {
    /// The wire-format name of this reason.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::CallerHangup => "caller_hangup",
            EndReason::CalleeHangup => "callee_hangup",
            EndReason::CallerDisconnected => "caller_disconnected",
            EndReason::CalleeDisconnected => "callee_disconnected",
            EndReason::Timeout => "timeout",
        }
    }
}

/// Which side of a call a client is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Caller,
    Callee,
}

impl Role {
    /// The hangup reason for this role.
    #[must_use]
    pub fn hangup_reason(self) -> EndReason {
        match self {
            Role::Caller => EndReason::CallerHangup,
            Role::Callee => EndReason::CalleeHangup,
        }
    }

    /// The disconnect reason for this role.
    #[must_use]
    pub fn disconnect_reason(self) -> EndReason {
        match self {
            Role::Caller => EndReason::CallerDisconnected,
            Role::Callee => EndReason::CalleeDisconnected,
        }
    }
}

/// Direction of a call relative to the client asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// The persisted call document.
///
/// The store's version token is not part of the entity; it lives in the
/// storage layer and is never exposed through any external interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    /// Opaque unique id, immutable.
    pub call_id: String,
    /// Identity snapshot taken at creation; never re-resolved.
    pub caller_id: String,
    pub caller_name: String,
    pub callee_id: String,
    pub callee_name: String,
    /// Media-bridge conference hosting both endpoints.
    pub conference_id: String,
    /// Set once the caller endpoint is allocated.
    pub caller_endpoint_id: Option<String>,
    /// Set once the callee endpoint is allocated (on join).
    pub callee_endpoint_id: Option<String>,
    pub state: CallState,
    pub caller_ready: bool,
    pub callee_ready: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl Call {
    /// Create a new call in `offering` with both ready flags false.
    #[must_use]
    pub fn new(
        caller_id: impl Into<String>,
        caller_name: impl Into<String>,
        callee_id: impl Into<String>,
        callee_name: impl Into<String>,
        conference_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: generate_call_id(),
            caller_id: caller_id.into(),
            caller_name: caller_name.into(),
            callee_id: callee_id.into(),
            callee_name: callee_name.into(),
            conference_id: conference_id.into(),
            caller_endpoint_id: None,
            callee_endpoint_id: None,
            state: CallState::Offering,
            caller_ready: false,
            callee_ready: false,
            created_at: Utc::now(),
            ended_at: None,
            ended_by: None,
            end_reason: None,
        }
    }

    /// The role of `client_id` on this call, if it is a participant.
    #[must_use]
    pub fn participant_role(&self, client_id: &str) -> Option<Role> {
        if client_id == self.caller_id {
            Some(Role::Caller)
        } else if client_id == self.callee_id {
            Some(Role::Callee)
        } else {
            None
        }
    }

    /// Whether the call has reached its terminal state.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.state == CallState::Ended
    }

    /// Re-derive `state` from the ready pair.
    ///
    /// `active` is not independently settable: it holds exactly when both
    /// ready flags are true and the call has not ended.
    pub fn refresh_state(&mut self) {
        if self.state != CallState::Ended {
            self.state = if self.caller_ready && self.callee_ready {
                CallState::Active
            } else {
                CallState::Offering
            };
        }
    }

    /// Direction of this call from `client_id`'s point of view.
    ///
    /// Callers see `outgoing`; everyone else sees `incoming`.
    #[must_use]
    pub fn direction_for(&self, client_id: &str) -> CallDirection {
        if client_id == self.caller_id {
            CallDirection::Outgoing
        } else {
            CallDirection::Incoming
        }
    }
}

/// Generate a unique call id.
#[must_use]
pub fn generate_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// A call row as returned by the active-calls listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveCall {
    pub call_id: String,
    pub caller_id: String,
    pub caller_name: String,
    pub callee_id: String,
    pub callee_name: String,
    pub state: CallState,
    pub direction: CallDirection,
    pub created_at: DateTime<Utc>,
}

impl ActiveCall {
    /// Project a call for the given requester.
    #[must_use]
    pub fn from_call(call: &Call, client_id: &str) -> Self {
        Self {
            call_id: call.call_id.clone(),
            caller_id: call.caller_id.clone(),
            caller_name: call.caller_name.clone(),
            callee_id: call.callee_id.clone(),
            callee_name: call.callee_name.clone(),
            state: call.state,
            direction: call.direction_for(client_id),
            created_at: call.created_at,
        }
    }
}

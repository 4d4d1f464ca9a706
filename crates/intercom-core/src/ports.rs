//! Port traits for the orchestrator's external collaborators.
//!
//! These traits define the seams the core consumes but does not implement:
//! the media bridge that anchors call audio, the presence directory that
//! resolves callees, and the event sink that delivers realtime
//! notifications.

use crate::events::CallEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Media bridge failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The bridge rejected the request.
    #[error("Bridge rejected request: {0}")]
    Rejected(String),

    /// The bridge could not be reached.
    #[error("Bridge unreachable: {0}")]
    Unreachable(String),

    /// Other bridge failure.
    #[error("{0}")]
    Other(String),
}

/// A freshly allocated participant endpoint and its SDP offer.
#[derive(Debug, Clone)]
pub struct EndpointOffer {
    pub endpoint_id: String,
    pub sdp_offer: String,
}

/// The media bridge that hosts conferences and per-participant endpoints.
///
/// A conference hosts one endpoint per participant; each endpoint is one
/// media path negotiated through an SDP offer/answer exchange.
#[async_trait]
pub trait MediaBridge: Send + Sync {
    /// Allocate a new conference.
    async fn allocate_conference(&self) -> Result<String, BridgeError>;

    /// Allocate an endpoint on a conference, returning its SDP offer.
    async fn allocate_endpoint(&self, conference_id: &str) -> Result<EndpointOffer, BridgeError>;

    /// Configure an endpoint with the participant's SDP answer.
    async fn set_answer(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        sdp_answer: &str,
    ) -> Result<(), BridgeError>;

    /// Release a conference and all of its endpoints.
    ///
    /// Best-effort: callers log failures and move on.
    async fn release(&self, conference_id: &str) -> Result<(), BridgeError>;
}

/// What the presence directory knows about a client.
#[derive(Debug, Clone)]
pub struct PresenceInfo {
    pub name: String,
    pub is_online: bool,
}

/// Resolves whether a target client exists and is reachable.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    /// Look up a client. `None` means the client is unknown.
    async fn resolve(&self, client_id: &str) -> Option<PresenceInfo>;
}

/// Delivers targeted and broadcast realtime notifications.
///
/// Fire-and-forget: implementations log their own delivery failures. The
/// core never blocks on, or fails because of, event delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver an event to a single client.
    async fn send_to_client(&self, client_id: &str, event: CallEvent);

    /// Deliver an event to every connected client.
    async fn broadcast_to_all(&self, event: CallEvent);
}

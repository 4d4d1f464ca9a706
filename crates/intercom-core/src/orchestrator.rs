//! The call session orchestrator.
//!
//! The orchestrator is the only component that mutates call documents. Each
//! operation runs as an independent unit of work; no in-process locks
//! coordinate calls on the same id, and multiple server instances may run
//! against the same store. Correctness under races rests entirely on the
//! store's optimistic concurrency: every mutation is a single
//! `compare_and_update` whose closure re-checks its preconditions on each
//! conflict retry, so a losing writer observes the current document and
//! reports a clean 409 instead of clobbering it.
//!
//! Events are emitted only after a persistence success.

use crate::call::{ActiveCall, Call, CallState, EndReason, Role};
use crate::error::CallError;
use crate::events::CallEvent;
use crate::ports::{EventSink, MediaBridge, PresenceDirectory};
use crate::store::{CallStore, StoreError, UpdateError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful `initiate_call`.
#[derive(Debug, Clone)]
pub struct InitiatedCall {
    pub call_id: String,
    pub sdp_offer: String,
    pub callee_id: String,
    pub callee_name: String,
}

/// Result of a successful `join_call`.
#[derive(Debug, Clone)]
pub struct JoinedCall {
    pub call_id: String,
    pub sdp_offer: String,
    pub caller_id: String,
    pub caller_name: String,
}

/// Drives calls through signaling, arbitration, and teardown.
pub struct CallOrchestrator {
    store: Arc<dyn CallStore>,
    bridge: Arc<dyn MediaBridge>,
    presence: Arc<dyn PresenceDirectory>,
    events: Arc<dyn EventSink>,
}

impl CallOrchestrator {
    /// Create an orchestrator over its four collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn CallStore>,
        bridge: Arc<dyn MediaBridge>,
        presence: Arc<dyn PresenceDirectory>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            bridge,
            presence,
            events,
        }
    }

    /// Offer a call from `caller_id` to `callee_id`.
    ///
    /// Allocates a conference and the caller's endpoint, persists the call
    /// in `offering`, and notifies the callee.
    ///
    /// # Errors
    ///
    /// - Validation: self-call
    /// - NotFound: callee unknown to the presence directory
    /// - Conflict: callee known but not reachable
    pub async fn initiate_call(
        &self,
        caller_id: &str,
        caller_name: &str,
        callee_id: &str,
    ) -> Result<InitiatedCall, CallError> {
        if caller_id == callee_id {
            return Err(CallError::validation("Cannot call yourself"));
        }

        let callee = self
            .presence
            .resolve(callee_id)
            .await
            .ok_or_else(|| CallError::not_found("Unknown callee"))?;

        if !callee.is_online {
            return Err(CallError::conflict("Callee is not reachable"));
        }

        let conference_id = self
            .bridge
            .allocate_conference()
            .await
            .map_err(|e| CallError::internal(format!("Conference allocation failed: {e}")))?;

        let endpoint = match self.bridge.allocate_endpoint(&conference_id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.release_conference(&conference_id).await;
                return Err(CallError::internal(format!("Endpoint allocation failed: {e}")));
            }
        };

        let mut call = Call::new(caller_id, caller_name, callee_id, &callee.name, &conference_id);
        call.caller_endpoint_id = Some(endpoint.endpoint_id);

        // Without a call document referencing it, the conference could never
        // be reclaimed by end-of-call teardown.
        if let Err(e) = self.store.create(&call).await {
            self.release_conference(&conference_id).await;
            return Err(CallError::internal(format!("Failed to persist call: {e}")));
        }

        info!(
            call = %call.call_id,
            caller = %caller_id,
            callee = %callee_id,
            conference = %conference_id,
            "Call initiated"
        );

        self.events
            .send_to_client(
                callee_id,
                CallEvent::CallIncoming {
                    call_id: call.call_id.clone(),
                    caller_id: caller_id.to_string(),
                    caller_name: caller_name.to_string(),
                },
            )
            .await;

        Ok(InitiatedCall {
            call_id: call.call_id,
            sdp_offer: endpoint.sdp_offer,
            callee_id: callee_id.to_string(),
            callee_name: callee.name,
        })
    }

    /// Complete the caller's side of signaling with their SDP answer.
    ///
    /// Marks the caller ready; the call goes `active` once both sides are.
    pub async fn complete_caller_signaling(
        &self,
        call_id: &str,
        caller_id: &str,
        sdp_answer: &str,
    ) -> Result<Call, CallError> {
        self.complete_signaling(call_id, caller_id, Role::Caller, sdp_answer)
            .await
    }

    /// Complete the callee's side of signaling with their SDP answer.
    ///
    /// Marks the callee ready; the call goes `active` once both sides are.
    pub async fn complete_callee_signaling(
        &self,
        call_id: &str,
        callee_id: &str,
        sdp_answer: &str,
    ) -> Result<Call, CallError> {
        self.complete_signaling(call_id, callee_id, Role::Callee, sdp_answer)
            .await
    }

    /// Shared offer/answer completion path for either side.
    async fn complete_signaling(
        &self,
        call_id: &str,
        client_id: &str,
        role: Role,
        sdp_answer: &str,
    ) -> Result<Call, CallError> {
        let call = self.fetch(call_id).await?;
        check_role(&call, client_id, role)?;
        if call.is_ended() {
            return Err(CallError::conflict("Call already ended"));
        }

        let endpoint_id = match role {
            Role::Caller => call.caller_endpoint_id.clone(),
            Role::Callee => call.callee_endpoint_id.clone(),
        }
        .ok_or_else(|| CallError::conflict("No endpoint allocated for this participant"))?;

        if let Err(e) = self
            .bridge
            .set_answer(&call.conference_id, &endpoint_id, sdp_answer)
            .await
        {
            // A racing hangup releases the conference underneath this call;
            // report the terminal state, not the bridge fault it caused.
            if let Ok(current) = self.store.get(call_id).await {
                if current.is_ended() {
                    return Err(CallError::conflict("Call already ended"));
                }
            }
            return Err(CallError::internal(format!("Failed to apply SDP answer: {e}")));
        }

        // Re-checked on every conflict retry: a racing end must win cleanly.
        let mut became_active = false;
        let mut mutate = |current: &Call| -> Result<Call, CallError> {
            check_role(current, client_id, role)?;
            if current.is_ended() {
                return Err(CallError::conflict("Call already ended"));
            }

            let mut next = current.clone();
            match role {
                Role::Caller => next.caller_ready = true,
                Role::Callee => next.callee_ready = true,
            }
            next.refresh_state();
            became_active =
                current.state != CallState::Active && next.state == CallState::Active;
            Ok(next)
        };

        let updated = self
            .store
            .compare_and_update(call_id, &mut mutate)
            .await
            .map_err(map_update_error)?;

        debug!(
            call = %call_id,
            client = %client_id,
            state = ?updated.state,
            "Signaling completed"
        );

        if became_active {
            info!(call = %call_id, "Call active");
            self.events
                .broadcast_to_all(CallEvent::CallStarted {
                    call_id: call_id.to_string(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Join a call as its callee, allocating the callee's media endpoint.
    ///
    /// Always allocates a fresh endpoint, so a callee that reconnects and
    /// joins again gets a new offer; the latest endpoint wins and every
    /// endpoint is reclaimed when the conference is released at end-of-call.
    pub async fn join_call(&self, call_id: &str, callee_id: &str) -> Result<JoinedCall, CallError> {
        let call = self.fetch(call_id).await?;
        check_role(&call, callee_id, Role::Callee)?;
        if call.is_ended() {
            return Err(CallError::conflict("Call already ended"));
        }

        let endpoint = self
            .bridge
            .allocate_endpoint(&call.conference_id)
            .await
            .map_err(|e| CallError::internal(format!("Endpoint allocation failed: {e}")))?;

        let endpoint_id = endpoint.endpoint_id.clone();
        let mut mutate = |current: &Call| -> Result<Call, CallError> {
            check_role(current, callee_id, Role::Callee)?;
            if current.is_ended() {
                return Err(CallError::conflict("Call already ended"));
            }

            let mut next = current.clone();
            next.callee_endpoint_id = Some(endpoint_id.clone());
            Ok(next)
        };

        let updated = self
            .store
            .compare_and_update(call_id, &mut mutate)
            .await
            .map_err(map_update_error)?;

        debug!(call = %call_id, callee = %callee_id, "Callee joined");

        Ok(JoinedCall {
            call_id: call_id.to_string(),
            sdp_offer: endpoint.sdp_offer,
            caller_id: updated.caller_id,
            caller_name: updated.caller_name,
        })
    }

    /// End a call on behalf of one of its participants.
    ///
    /// First caller wins: the transition to `ended` is persisted exactly
    /// once and every later attempt observes a 409. Bridge teardown is
    /// best-effort and never blocks the state write.
    pub async fn end_call(&self, call_id: &str, client_id: &str) -> Result<Call, CallError> {
        self.end_with(call_id, client_id, Role::hangup_reason).await
    }

    /// Persist the terminal transition, then release bridge resources and
    /// notify. `reason_for` derives the end reason from the ender's role.
    async fn end_with(
        &self,
        call_id: &str,
        client_id: &str,
        reason_for: impl Fn(Role) -> EndReason + Send + Sync,
    ) -> Result<Call, CallError> {
        let mut mutate = |current: &Call| -> Result<Call, CallError> {
            let role = current
                .participant_role(client_id)
                .ok_or_else(|| CallError::unauthorized("Not a participant in this call"))?;
            if current.is_ended() {
                return Err(CallError::conflict("Call already ended"));
            }

            let mut next = current.clone();
            next.state = CallState::Ended;
            next.ended_at = Some(Utc::now());
            next.ended_by = Some(client_id.to_string());
            next.end_reason = Some(reason_for(role));
            Ok(next)
        };

        let ended = self
            .store
            .compare_and_update(call_id, &mut mutate)
            .await
            .map_err(map_update_error)?;

        info!(
            call = %call_id,
            ended_by = %client_id,
            reason = ?ended.end_reason,
            "Call ended"
        );

        // Teardown failures are reconciled out-of-band; the call has ended
        // regardless.
        self.release_conference(&ended.conference_id).await;

        let event = CallEvent::CallEnded {
            call_id: ended.call_id.clone(),
            ended_by: client_id.to_string(),
            end_reason: ended.end_reason.unwrap_or(EndReason::CallerHangup),
        };

        let other = if ended.caller_id == client_id {
            ended.callee_id.clone()
        } else {
            ended.caller_id.clone()
        };
        self.events.send_to_client(&other, event.clone()).await;
        self.events.broadcast_to_all(event).await;

        Ok(ended)
    }

    /// List the requester's non-ended calls with their direction.
    pub async fn get_active_calls_for_client(
        &self,
        client_id: &str,
    ) -> Result<Vec<ActiveCall>, CallError> {
        let calls = self
            .store
            .active_for_participant(client_id)
            .await
            .map_err(|e| CallError::internal(format!("Failed to query calls: {e}")))?;

        Ok(calls
            .iter()
            .filter(|c| !c.is_ended())
            .map(|c| ActiveCall::from_call(c, client_id))
            .collect())
    }

    /// End every active or offering call the client participates in, with a
    /// `*_disconnected` reason.
    ///
    /// Each call is ended independently; partial success is allowed. A call
    /// that raced to `ended` underneath us is logged and skipped. Returns
    /// the ended call documents.
    pub async fn end_call_due_to_disconnect(&self, client_id: &str) -> Vec<Call> {
        let calls = match self.store.active_for_participant(client_id).await {
            Ok(calls) => calls,
            Err(e) => {
                warn!(client = %client_id, error = %e, "Disconnect cleanup query failed");
                return Vec::new();
            }
        };

        let mut ended = Vec::new();
        for call in calls {
            match self
                .end_with(&call.call_id, client_id, Role::disconnect_reason)
                .await
            {
                Ok(call) => ended.push(call),
                Err(e) => {
                    warn!(
                        call = %call.call_id,
                        client = %client_id,
                        error = %e,
                        "Disconnect cleanup skipped call"
                    );
                }
            }
        }

        if !ended.is_empty() {
            info!(client = %client_id, calls = ended.len(), "Ended calls after disconnect");
        }
        ended
    }

    /// End every `offering` call older than `max_age` with reason `timeout`.
    ///
    /// Unanswered offers are swept on an interval; the offerer is recorded
    /// as the ender. Returns the ended call documents.
    pub async fn expire_stale_offers(&self, max_age: Duration) -> Vec<Call> {
        let cutoff = Utc::now() - max_age;
        let stale = match self.store.expired_offers(cutoff).await {
            Ok(calls) => calls,
            Err(e) => {
                warn!(error = %e, "Stale offer query failed");
                return Vec::new();
            }
        };

        let mut ended = Vec::new();
        for call in stale {
            let caller_id = call.caller_id.clone();
            match self
                .end_with(&call.call_id, &caller_id, |_| EndReason::Timeout)
                .await
            {
                Ok(call) => ended.push(call),
                Err(e) => {
                    debug!(call = %call.call_id, error = %e, "Offer expiry skipped call");
                }
            }
        }

        if !ended.is_empty() {
            info!(calls = ended.len(), "Expired stale offers");
        }
        ended
    }
}

/// Verify the client holds the expected role, or report who may.
fn check_role(call: &Call, client_id: &str, expected: Role) -> Result<(), CallError> {
    match call.participant_role(client_id) {
        Some(role) if role == expected => Ok(()),
        _ => Err(match expected {
            Role::Caller => CallError::unauthorized("Not the caller on this call"),
            Role::Callee => CallError::unauthorized("Not the callee on this call"),
        }),
    }
}

impl CallOrchestrator {
    /// Fetch a call, mapping store failures to the operation taxonomy.
    async fn fetch(&self, call_id: &str) -> Result<Call, CallError> {
        self.store.get(call_id).await.map_err(|e| match e {
            StoreError::NotFound => CallError::not_found("Call not found"),
            other => CallError::internal(format!("Failed to load call: {other}")),
        })
    }

    /// Best-effort conference release. Failures are logged and swallowed.
    async fn release_conference(&self, conference_id: &str) {
        if let Err(e) = self.bridge.release(conference_id).await {
            warn!(conference = %conference_id, error = %e, "Bridge release failed");
        }
    }
}

/// Map a conditional-update failure to the operation taxonomy.
fn map_update_error(err: UpdateError) -> CallError {
    match err {
        UpdateError::NotFound => CallError::not_found("Call not found"),
        UpdateError::Rejected(e) => e,
        UpdateError::ConflictExhausted => {
            CallError::conflict("Call was modified concurrently, please retry")
        }
        UpdateError::Store(e) => CallError::internal(format!("Store failure: {e}")),
    }
}

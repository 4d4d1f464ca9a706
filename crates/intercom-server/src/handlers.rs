//! HTTP and WebSocket handlers for the Intercom server.
//!
//! This module translates HTTP verbs to orchestrator calls and orchestrator
//! errors to status codes, and runs the per-client event socket.

use crate::auth::{Identity, TokenVerifier};
use crate::bridge::HttpMediaBridge;
use crate::config::Config;
use crate::metrics;
use crate::registry::ClientRegistry;
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRef, Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use intercom_core::{ActiveCall, Call, CallError, CallOrchestrator, EndReason, ErrorKind};
use intercom_store::{DocumentStore, MemoryBackend};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The call orchestrator.
    pub orchestrator: Arc<CallOrchestrator>,
    /// Connected clients: presence and event delivery.
    pub registry: Arc<ClientRegistry>,
    /// Bearer-token verification.
    pub verifier: TokenVerifier,
    /// Server configuration.
    pub config: Config,
}

impl FromRef<Arc<AppState>> for TokenVerifier {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.verifier.clone()
    }
}

impl AppState {
    /// Wire the production collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let registry = Arc::new(ClientRegistry::new());
        let store = Arc::new(DocumentStore::with_policy(
            Arc::new(MemoryBackend::new()),
            config.retry_policy(),
        ));
        let bridge = Arc::new(HttpMediaBridge::new(
            config.bridge.base_url.clone(),
            Duration::from_millis(config.bridge.request_timeout_ms),
        )?);

        let orchestrator = Arc::new(CallOrchestrator::new(
            store,
            bridge,
            registry.clone(),
            registry.clone(),
        ));

        let verifier = TokenVerifier::new(&config.auth.secret);

        Ok(Self {
            orchestrator,
            registry,
            verifier,
            config,
        })
    }
}

/// Error body returned to API consumers.
struct ApiError(CallError);

impl From<CallError> for ApiError {
    fn from(err: CallError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        // Internal detail stays in the logs.
        let message = if self.0.kind == ErrorKind::Internal {
            error!(error = %self.0, "Internal error");
            metrics::record_error("internal");
            "Internal server error".to_string()
        } else {
            self.0.message
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitiateRequest {
    callee_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitiateResponse {
    call_id: String,
    sdp_offer: String,
    callee_id: String,
    callee_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnswerRequest {
    sdp_answer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JoinResponse {
    call_id: String,
    sdp_offer: String,
    caller_id: String,
    caller_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndResponse {
    call_id: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct ActiveCallsResponse {
    calls: Vec<ActiveCall>,
}

/// Build the router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/call", post(initiate_call))
        .route("/call/active", get(active_calls))
        .route("/call/:call_id", patch(caller_answer).delete(end_call))
        .route("/call/:call_id/join", post(join_call))
        .route("/call/:call_id/answer", patch(callee_answer))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.bind_addr()?;
    let sweep_interval = Duration::from_millis(state.config.calls.sweep_interval_ms);
    let offer_timeout = chrono::Duration::milliseconds(state.config.calls.offer_timeout_ms as i64);

    // Unanswered offers are ended with reason `timeout` on an interval.
    let sweeper = state.orchestrator.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            for call in sweeper.expire_stale_offers(offer_timeout).await {
                record_ended_call(&call);
            }
        }
    });

    let app = router(state);
    let listener = TcpListener::bind(addr).await?;

    info!("Intercom server listening on {}", addr);
    info!("Event socket: ws://{}/ws", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Record the ended-call metrics for a terminal call document. Called on
/// every path that ends a call: hangup, disconnect cleanup, offer expiry.
fn record_ended_call(call: &Call) {
    let reason = call.end_reason.map(EndReason::as_str).unwrap_or_default();
    let duration = call
        .ended_at
        .map(|t| (t - call.created_at).num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0);
    metrics::record_call_ended(reason, duration);
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `POST /call`: offer a call to another client.
async fn initiate_call(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(body): Json<InitiateRequest>,
) -> Result<(StatusCode, Json<InitiateResponse>), ApiError> {
    let initiated = state
        .orchestrator
        .initiate_call(&identity.client_id, &identity.name, &body.callee_id)
        .await?;

    metrics::record_call_initiated();

    Ok((
        StatusCode::CREATED,
        Json(InitiateResponse {
            call_id: initiated.call_id,
            sdp_offer: initiated.sdp_offer,
            callee_id: initiated.callee_id,
            callee_name: initiated.callee_name,
        }),
    ))
}

/// `PATCH /call/:call_id`: the caller's SDP answer.
async fn caller_answer(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    identity: Identity,
    Json(body): Json<AnswerRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .complete_caller_signaling(&call_id, &identity.client_id, &body.sdp_answer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /call/:call_id/join`: the callee joins and gets their offer.
async fn join_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    identity: Identity,
) -> Result<Json<JoinResponse>, ApiError> {
    let joined = state
        .orchestrator
        .join_call(&call_id, &identity.client_id)
        .await?;

    Ok(Json(JoinResponse {
        call_id: joined.call_id,
        sdp_offer: joined.sdp_offer,
        caller_id: joined.caller_id,
        caller_name: joined.caller_name,
    }))
}

/// `PATCH /call/:call_id/answer`: the callee's SDP answer.
async fn callee_answer(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    identity: Identity,
    Json(body): Json<AnswerRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .orchestrator
        .complete_callee_signaling(&call_id, &identity.client_id, &body.sdp_answer)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /call/:call_id`: hang up.
async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<String>,
    identity: Identity,
) -> Result<Json<EndResponse>, ApiError> {
    let ended = state
        .orchestrator
        .end_call(&call_id, &identity.client_id)
        .await?;

    record_ended_call(&ended);

    Ok(Json(EndResponse {
        call_id: ended.call_id,
        message: "Call ended".to_string(),
    }))
}

/// `GET /call/active`: the requester's non-ended calls.
async fn active_calls(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ActiveCallsResponse>, ApiError> {
    let calls = state
        .orchestrator
        .get_active_calls_for_client(&identity.client_id)
        .await?;
    Ok(Json(ActiveCallsResponse { calls }))
}

/// WebSocket upgrade handler for the event socket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_event_socket(socket, state, identity))
}

/// Run one client's event socket.
///
/// Connecting registers the client as online; closing marks it offline and
/// ends its calls with a disconnect reason.
async fn handle_event_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let client_id = identity.client_id.clone();
    let (mut events, token) = state.registry.connect(&client_id, &identity.name);
    metrics::set_clients_online(state.registry.online_count());

    debug!(client = %client_id, "Event socket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    // Replaced by a newer connection for the same client
                    break;
                };
                match serde_json::to_string(&event) {
                    Ok(payload) => {
                        metrics::record_event(event.name());
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(client = %client_id, error = %e, "Event serialization failed");
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(client = %client_id, "Event socket closed");
                        break;
                    }
                    Some(Ok(_)) => {
                        // The event socket is one-way; inbound payloads are
                        // ignored.
                    }
                    Some(Err(e)) => {
                        warn!(client = %client_id, error = %e, "Event socket error");
                        break;
                    }
                }
            }
        }
    }

    // A stale token means the client reconnected while this socket was
    // closing; the new connection owns presence and the calls.
    if state.registry.disconnect(&client_id, token) {
        metrics::set_clients_online(state.registry.online_count());

        let ended = state.orchestrator.end_call_due_to_disconnect(&client_id).await;
        for call in &ended {
            record_ended_call(call);
        }
        if !ended.is_empty() {
            info!(
                client = %client_id,
                calls = ended.len(),
                "Cleaned up calls after disconnect"
            );
        }
    }
}

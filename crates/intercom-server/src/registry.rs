//! Client registry: presence plus event delivery.
//!
//! Clients connect over the event WebSocket and register here. The registry
//! keeps every client it has ever seen (so a known-but-offline callee is
//! distinguishable from an unknown one) and, for each online client, the
//! sender feeding its socket. It backs both the presence port and the event
//! sink; delivery is fire-and-forget and failures are logged, never
//! surfaced.

use async_trait::async_trait;
use dashmap::DashMap;
use intercom_core::{CallEvent, EventSink, PresenceDirectory, PresenceInfo};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outbound event channel capacity per client.
const CLIENT_CHANNEL_CAPACITY: usize = 64;

/// One registered client.
#[derive(Debug)]
struct ClientEntry {
    name: String,
    /// Identifies the connection that owns this entry; a reconnect bumps it.
    generation: u64,
    /// Present while the client's socket is connected.
    sender: Option<mpsc::Sender<CallEvent>>,
}

/// Registry of every client this server has seen.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: DashMap<String, ClientEntry>,
    generation: AtomicU64,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client as online, returning the receiver that feeds its
    /// socket and the token identifying this connection.
    ///
    /// A reconnect replaces the previous sender and invalidates the older
    /// connection's token; events then flow to the newest socket only.
    pub fn connect(
        &self,
        client_id: impl Into<String>,
        name: impl Into<String>,
    ) -> (mpsc::Receiver<CallEvent>, u64) {
        let (tx, rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let client_id = client_id.into();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.clients.insert(
            client_id.clone(),
            ClientEntry {
                name: name.into(),
                generation,
                sender: Some(tx),
            },
        );
        debug!(client = %client_id, generation, "Client connected");
        (rx, generation)
    }

    /// Mark a client offline if `token` still identifies its live
    /// connection, keeping its directory entry.
    ///
    /// A stale token means the client already reconnected; the teardown of
    /// the superseded socket must not knock the new connection offline.
    /// Returns whether the client was marked offline.
    pub fn disconnect(&self, client_id: &str, token: u64) -> bool {
        if let Some(mut entry) = self.clients.get_mut(client_id) {
            if entry.generation == token && entry.sender.is_some() {
                entry.sender = None;
                debug!(client = %client_id, "Client disconnected");
                return true;
            }
        }
        false
    }

    /// Number of currently online clients.
    #[must_use]
    pub fn online_count(&self) -> usize {
        self.clients
            .iter()
            .filter(|e| e.sender.is_some())
            .count()
    }
}

#[async_trait]
impl PresenceDirectory for ClientRegistry {
    async fn resolve(&self, client_id: &str) -> Option<PresenceInfo> {
        self.clients.get(client_id).map(|entry| PresenceInfo {
            name: entry.name.clone(),
            is_online: entry.sender.is_some(),
        })
    }
}

#[async_trait]
impl EventSink for ClientRegistry {
    async fn send_to_client(&self, client_id: &str, event: CallEvent) {
        let sender = self
            .clients
            .get(client_id)
            .and_then(|entry| entry.sender.clone());

        match sender {
            Some(tx) => {
                if let Err(e) = tx.try_send(event) {
                    warn!(client = %client_id, error = %e, "Event delivery failed");
                }
            }
            None => {
                debug!(client = %client_id, "Dropping event for offline client");
            }
        }
    }

    async fn broadcast_to_all(&self, event: CallEvent) {
        let senders: Vec<(String, mpsc::Sender<CallEvent>)> = self
            .clients
            .iter()
            .filter_map(|entry| {
                entry
                    .sender
                    .clone()
                    .map(|tx| (entry.key().clone(), tx))
            })
            .collect();

        for (client_id, tx) in senders {
            if let Err(e) = tx.try_send(event.clone()) {
                warn!(client = %client_id, error = %e, "Broadcast delivery failed");
            }
        }
    }
}

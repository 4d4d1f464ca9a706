//! Versioned document backends.
//!
//! A backend stores call documents keyed by id, each carrying an opaque
//! version that changes on every committed write. Backends implement only
//! the primitive operations; all retry and conflict policy lives in
//! [`DocumentStore`](crate::store::DocumentStore).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use intercom_core::{Call, CallState};
use thiserror::Error;

/// A call document together with its storage version.
///
/// The version never leaves the storage layer.
#[derive(Debug, Clone)]
pub struct VersionedCall {
    pub call: Call,
    pub version: u64,
}

/// Backend failures, classified for the retry policy.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Insert hit an existing id. Never retried.
    #[error("Document already exists")]
    AlreadyExists,

    /// Timeout, reset, dropped connection. Safe to retry the identical
    /// operation.
    #[error("Transient backend fault: {0}")]
    Transient(String),

    /// Everything else (authorization, malformed payload at the storage
    /// boundary). Never retried.
    #[error("Backend failure: {0}")]
    Internal(String),
}

/// Outcome of a conditional replace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreIfOutcome {
    /// The document was replaced; carries the new version.
    Stored(u64),
    /// The stored version no longer matches what the writer read.
    VersionMismatch,
    /// The document disappeared (never the case for calls, which are
    /// retained forever, but the contract covers it).
    Missing,
}

/// Primitive operations over versioned call documents.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Load a document and its current version.
    async fn load(&self, call_id: &str) -> Result<Option<VersionedCall>, BackendError>;

    /// Insert a new document at version 1.
    async fn insert(&self, call: &Call) -> Result<(), BackendError>;

    /// Replace the document if and only if its version equals `expected`.
    async fn store_if_version(
        &self,
        call: &Call,
        expected: u64,
    ) -> Result<StoreIfOutcome, BackendError>;

    /// All non-ended calls where the client is caller or callee.
    async fn scan_active(&self, client_id: &str) -> Result<Vec<Call>, BackendError>;

    /// All `offering` calls created before the cutoff.
    async fn scan_offering_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Call>, BackendError>;
}

/// In-memory backend on a concurrent map.
///
/// The version check and replace run under the entry lock, which is what
/// makes `store_if_version` atomic.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    docs: DashMap<String, VersionedCall>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the backend holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn load(&self, call_id: &str) -> Result<Option<VersionedCall>, BackendError> {
        Ok(self.docs.get(call_id).map(|entry| entry.clone()))
    }

    async fn insert(&self, call: &Call) -> Result<(), BackendError> {
        match self.docs.entry(call.call_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(BackendError::AlreadyExists),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(VersionedCall {
                    call: call.clone(),
                    version: 1,
                });
                Ok(())
            }
        }
    }

    async fn store_if_version(
        &self,
        call: &Call,
        expected: u64,
    ) -> Result<StoreIfOutcome, BackendError> {
        match self.docs.get_mut(&call.call_id) {
            Some(mut entry) => {
                if entry.version != expected {
                    return Ok(StoreIfOutcome::VersionMismatch);
                }
                entry.call = call.clone();
                entry.version += 1;
                Ok(StoreIfOutcome::Stored(entry.version))
            }
            None => Ok(StoreIfOutcome::Missing),
        }
    }

    async fn scan_active(&self, client_id: &str) -> Result<Vec<Call>, BackendError> {
        Ok(self
            .docs
            .iter()
            .filter(|entry| {
                let call = &entry.call;
                call.state != CallState::Ended && call.participant_role(client_id).is_some()
            })
            .map(|entry| entry.call.clone())
            .collect())
    }

    async fn scan_offering_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Call>, BackendError> {
        Ok(self
            .docs
            .iter()
            .filter(|entry| {
                entry.call.state == CallState::Offering && entry.call.created_at < cutoff
            })
            .map(|entry| entry.call.clone())
            .collect())
    }
}

//! The call store contract.
//!
//! The store is the exclusive owner of call documents and of all
//! retry/conflict policy. It offers optimistic concurrency: every write
//! carries the version read just before it, and on a version mismatch the
//! store re-reads and re-applies the caller's mutation from scratch. The
//! orchestrator never sees versions; it sees only the outcomes defined here.

use crate::call::Call;
use crate::error::CallError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Store failures for plain (non-conditional) operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document is absent. Never retried.
    #[error("Call not found")]
    NotFound,

    /// A document with this id already exists.
    #[error("Call already exists")]
    AlreadyExists,

    /// The backend stayed unreachable through the transient-retry budget.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Any other storage failure. Never retried.
    #[error("Store failure: {0}")]
    Internal(String),
}

/// Outcome of a conditional update.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The document is absent.
    #[error("Call not found")]
    NotFound,

    /// The mutation itself refused the transition (stale precondition,
    /// wrong participant, already ended). Carries the domain error.
    #[error("{0}")]
    Rejected(CallError),

    /// The version-conflict retry budget ran out.
    #[error("Concurrent updates exhausted the retry budget")]
    ConflictExhausted,

    /// The backend failed underneath the update.
    #[error(transparent)]
    Store(StoreError),
}

/// A mutation applied under optimistic concurrency.
///
/// The closure is re-run against a fresh read on every version conflict, so
/// it must re-check its preconditions each time: a losing concurrent writer
/// observes the current document, not a snapshot.
pub type MutateFn<'a> = &'a mut (dyn FnMut(&Call) -> Result<Call, CallError> + Send);

/// Key-addressed document store for calls.
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Fetch a call by id.
    async fn get(&self, call_id: &str) -> Result<Call, StoreError>;

    /// Create a new call document.
    ///
    /// Ids are globally unique tokens; a collision reports
    /// [`StoreError::AlreadyExists`].
    async fn create(&self, call: &Call) -> Result<(), StoreError>;

    /// Read-modify-write under optimistic concurrency.
    ///
    /// Applies `mutate` to the current document and writes the result back
    /// conditioned on the version being unchanged. On a mismatch the store
    /// re-reads and re-applies `mutate` from scratch, up to a fixed bound.
    /// Returns the updated call on success.
    async fn compare_and_update(
        &self,
        call_id: &str,
        mutate: MutateFn<'_>,
    ) -> Result<Call, UpdateError>;

    /// All calls in `offering` or `active` where the client participates.
    async fn active_for_participant(&self, client_id: &str) -> Result<Vec<Call>, StoreError>;

    /// All calls still in `offering` that were created before the cutoff.
    async fn expired_offers(&self, older_than: DateTime<Utc>) -> Result<Vec<Call>, StoreError>;
}

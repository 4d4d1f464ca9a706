//! # intercom-store
//!
//! Document backends and the concrete [`CallStore`] implementation for
//! Intercom.
//!
//! The split mirrors the store contract: a [`DocumentBackend`] knows how to
//! load, insert, and conditionally replace versioned call documents, and
//! nothing else. [`DocumentStore`] layers the whole retry/conflict policy on
//! top (bounded conflict re-application, transient-fault backoff, and the
//! strict separation of the two) so backend quirks never reach the
//! orchestrator.
//!
//! Any backend must pass the conformance suite in `store.rs`; it runs
//! against every backend, fault-injected or not, with identical
//! expectations.
//!
//! [`CallStore`]: intercom_core::CallStore

pub mod backend;
pub mod retry;
pub mod store;

pub use backend::{BackendError, DocumentBackend, MemoryBackend, StoreIfOutcome, VersionedCall};
pub use retry::RetryPolicy;
pub use store::DocumentStore;

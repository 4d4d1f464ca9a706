//! The concrete call store.
//!
//! `DocumentStore` wraps whichever [`DocumentBackend`] is configured and
//! owns every retry and conflict decision. Three failure classes, never
//! conflated:
//!
//! 1. Not-found: returned immediately, never retried.
//! 2. Version conflict: fresh read, re-apply the caller's mutation, bounded.
//! 3. Transient fault: retry the identical backend operation with backoff.
//!
//! Anything else propagates unchanged on first sight.

use crate::backend::{BackendError, DocumentBackend, StoreIfOutcome};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use intercom_core::store::{CallStore, MutateFn, StoreError, UpdateError};
use intercom_core::Call;
use std::sync::Arc;
use tracing::{debug, warn};

/// [`CallStore`] implementation over a versioned document backend.
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    policy: RetryPolicy,
}

impl DocumentStore {
    /// Create a store with the default retry policy.
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self::with_policy(backend, RetryPolicy::default())
    }

    /// Create a store with a custom retry policy.
    #[must_use]
    pub fn with_policy(backend: Arc<dyn DocumentBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }
}

fn map_backend(err: BackendError) -> StoreError {
    match err {
        BackendError::AlreadyExists => StoreError::AlreadyExists,
        BackendError::Transient(msg) => StoreError::Unavailable(msg),
        BackendError::Internal(msg) => StoreError::Internal(msg),
    }
}

#[async_trait]
impl CallStore for DocumentStore {
    async fn get(&self, call_id: &str) -> Result<Call, StoreError> {
        let loaded = self
            .policy
            .run_transient("load", || self.backend.load(call_id))
            .await
            .map_err(map_backend)?;
        loaded.map(|v| v.call).ok_or(StoreError::NotFound)
    }

    async fn create(&self, call: &Call) -> Result<(), StoreError> {
        self.policy
            .run_transient("insert", || self.backend.insert(call))
            .await
            .map_err(map_backend)
    }

    async fn compare_and_update(
        &self,
        call_id: &str,
        mutate: MutateFn<'_>,
    ) -> Result<Call, UpdateError> {
        for attempt in 0..self.policy.max_conflict_attempts {
            // Re-read on every attempt: the mutation is re-applied to the
            // current document, never to a stale copy.
            let loaded = self
                .policy
                .run_transient("load", || self.backend.load(call_id))
                .await
                .map_err(|e| UpdateError::Store(map_backend(e)))?;

            let Some(versioned) = loaded else {
                return Err(UpdateError::NotFound);
            };

            let next = mutate(&versioned.call).map_err(UpdateError::Rejected)?;

            let outcome = self
                .policy
                .run_transient("store_if_version", || {
                    self.backend.store_if_version(&next, versioned.version)
                })
                .await
                .map_err(|e| UpdateError::Store(map_backend(e)))?;

            match outcome {
                StoreIfOutcome::Stored(version) => {
                    debug!(call = %call_id, version, "Conditional update committed");
                    return Ok(next);
                }
                StoreIfOutcome::VersionMismatch => {
                    warn!(call = %call_id, attempt = attempt + 1, "Version conflict, re-applying");
                }
                StoreIfOutcome::Missing => return Err(UpdateError::NotFound),
            }
        }

        Err(UpdateError::ConflictExhausted)
    }

    async fn active_for_participant(&self, client_id: &str) -> Result<Vec<Call>, StoreError> {
        self.policy
            .run_transient("scan_active", || self.backend.scan_active(client_id))
            .await
            .map_err(map_backend)
    }

    async fn expired_offers(&self, older_than: DateTime<Utc>) -> Result<Vec<Call>, StoreError> {
        self.policy
            .run_transient("scan_offering", || {
                self.backend.scan_offering_older_than(older_than)
            })
            .await
            .map_err(map_backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, VersionedCall};
    use intercom_core::{CallError, CallState};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    fn call(id: &str) -> Call {
        let mut c = Call::new("client1", "Alice", "client2", "Bob", "conf-1");
        c.call_id = id.to_string();
        c
    }

    /// Wraps a backend with injectable transient faults and a scripted
    /// competing writer that commits just before our conditional write.
    struct FlakyBackend {
        inner: Arc<MemoryBackend>,
        transient_loads: AtomicU32,
        transient_stores: AtomicU32,
        races_remaining: AtomicU32,
    }

    impl FlakyBackend {
        fn new(inner: Arc<MemoryBackend>) -> Self {
            Self {
                inner,
                transient_loads: AtomicU32::new(0),
                transient_stores: AtomicU32::new(0),
                races_remaining: AtomicU32::new(0),
            }
        }

        fn fail_loads(&self, n: u32) {
            self.transient_loads.store(n, Ordering::SeqCst);
        }

        fn fail_stores(&self, n: u32) {
            self.transient_stores.store(n, Ordering::SeqCst);
        }

        fn race_times(&self, n: u32) {
            self.races_remaining.store(n, Ordering::SeqCst);
        }

        fn take(counter: &AtomicU32) -> bool {
            counter
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    #[async_trait]
    impl DocumentBackend for FlakyBackend {
        async fn load(&self, call_id: &str) -> Result<Option<VersionedCall>, BackendError> {
            if Self::take(&self.transient_loads) {
                return Err(BackendError::Transient("connection reset".into()));
            }
            self.inner.load(call_id).await
        }

        async fn insert(&self, call: &Call) -> Result<(), BackendError> {
            self.inner.insert(call).await
        }

        async fn store_if_version(
            &self,
            call: &Call,
            expected: u64,
        ) -> Result<StoreIfOutcome, BackendError> {
            if Self::take(&self.transient_stores) {
                return Err(BackendError::Transient("write timeout".into()));
            }
            if Self::take(&self.races_remaining) {
                // A competing writer ends the call first.
                if let Some(current) = self.inner.load(&call.call_id).await? {
                    let mut raced = current.call.clone();
                    raced.state = CallState::Ended;
                    raced.ended_by = Some(raced.callee_id.clone());
                    let _ = self
                        .inner
                        .store_if_version(&raced, current.version)
                        .await?;
                }
            }
            self.inner.store_if_version(call, expected).await
        }

        async fn scan_active(&self, client_id: &str) -> Result<Vec<Call>, BackendError> {
            self.inner.scan_active(client_id).await
        }

        async fn scan_offering_older_than(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<Call>, BackendError> {
            self.inner.scan_offering_older_than(cutoff).await
        }
    }

    /// Contract checks every backend must pass, fault-injected or not.
    async fn assert_conformance(backend: Arc<dyn DocumentBackend>) {
        let store = DocumentStore::with_policy(backend, fast_policy());

        // create / get
        store.create(&call("call_a")).await.unwrap();
        let fetched = store.get("call_a").await.unwrap();
        assert_eq!(fetched.call_id, "call_a");

        // ids are globally unique
        assert!(matches!(
            store.create(&call("call_a")).await,
            Err(StoreError::AlreadyExists)
        ));

        // absent documents are immediate, never retried into existence
        assert!(matches!(
            store.get("call_missing").await,
            Err(StoreError::NotFound)
        ));
        let mut noop = |c: &Call| -> Result<Call, CallError> { Ok(c.clone()) };
        assert!(matches!(
            store.compare_and_update("call_missing", &mut noop).await,
            Err(UpdateError::NotFound)
        ));

        // mutation commits and is visible
        let mut set_ready = |c: &Call| -> Result<Call, CallError> {
            let mut next = c.clone();
            next.caller_ready = true;
            Ok(next)
        };
        let updated = store
            .compare_and_update("call_a", &mut set_ready)
            .await
            .unwrap();
        assert!(updated.caller_ready);
        assert!(store.get("call_a").await.unwrap().caller_ready);

        // a rejecting mutation writes nothing and is not retried
        let mut reject_calls = 0;
        let mut reject = |_: &Call| -> Result<Call, CallError> {
            reject_calls += 1;
            Err(CallError::conflict("Call already ended"))
        };
        assert!(matches!(
            store.compare_and_update("call_a", &mut reject).await,
            Err(UpdateError::Rejected(_))
        ));
        assert_eq!(reject_calls, 1);

        // participant scan excludes strangers
        assert_eq!(store.active_for_participant("client1").await.unwrap().len(), 1);
        assert!(store
            .active_for_participant("client9")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_conformance_memory_backend() {
        assert_conformance(Arc::new(MemoryBackend::new())).await;
    }

    #[tokio::test]
    async fn test_conformance_flaky_backend() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(MemoryBackend::new())));
        flaky.fail_loads(1);
        flaky.fail_stores(1);
        assert_conformance(flaky).await;
    }

    #[tokio::test]
    async fn test_conflict_reapplies_against_current_document() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(MemoryBackend::new())));
        let store = DocumentStore::with_policy(flaky.clone(), fast_policy());

        store.create(&call("call_a")).await.unwrap();
        flaky.race_times(1);

        // The racing writer ends the call; our re-applied mutation must see
        // the ended document and refuse rather than clobber it.
        let mut observed_states = Vec::new();
        let mut mutate = |c: &Call| -> Result<Call, CallError> {
            observed_states.push(c.state);
            if c.state == CallState::Ended {
                return Err(CallError::conflict("Call already ended"));
            }
            let mut next = c.clone();
            next.caller_ready = true;
            Ok(next)
        };

        let result = store.compare_and_update("call_a", &mut mutate).await;
        assert!(matches!(result, Err(UpdateError::Rejected(_))));
        assert_eq!(observed_states, vec![CallState::Offering, CallState::Ended]);

        let stored = store.get("call_a").await.unwrap();
        assert_eq!(stored.state, CallState::Ended);
        assert!(!stored.caller_ready);
    }

    #[tokio::test]
    async fn test_conflict_budget_exhausts() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(MemoryBackend::new())));
        let store = DocumentStore::with_policy(flaky.clone(), fast_policy());

        store.create(&call("call_a")).await.unwrap();
        // Every attempt loses the race; the mutation itself never refuses.
        flaky.race_times(u32::MAX);

        let mut attempts = 0;
        let mut mutate = |c: &Call| -> Result<Call, CallError> {
            attempts += 1;
            let mut next = c.clone();
            next.caller_ready = true;
            Ok(next)
        };

        let result = store.compare_and_update("call_a", &mut mutate).await;
        assert!(matches!(result, Err(UpdateError::ConflictExhausted)));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_transient_faults_exhaust_to_unavailable() {
        let flaky = Arc::new(FlakyBackend::new(Arc::new(MemoryBackend::new())));
        let store = DocumentStore::with_policy(flaky.clone(), fast_policy());

        store.create(&call("call_a")).await.unwrap();
        flaky.fail_loads(u32::MAX);

        assert!(matches!(
            store.get("call_a").await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_offers_scan() {
        let store = DocumentStore::with_policy(Arc::new(MemoryBackend::new()), fast_policy());

        let mut old = call("call_old");
        old.created_at = Utc::now() - chrono::Duration::minutes(10);
        store.create(&old).await.unwrap();
        store.create(&call("call_new")).await.unwrap();

        let stale = store
            .expired_offers(Utc::now() - chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].call_id, "call_old");
    }
}

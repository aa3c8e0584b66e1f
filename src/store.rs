//! Temporal key-value store
//!
//! `put` is an upsert keyed by (key, timestamp). Each attempt runs in its own
//! backend transaction: look up the exact version, overwrite its value or
//! create it, commit. Writers racing to create the same version are settled by
//! the backend's uniqueness constraint; the loser's attempt is rolled back and
//! re-run from a fresh read, where it finds the winner's record and updates
//! it. There is no in-process writer lock, so any number of store instances
//! may share one backend.

use crate::config::{BackendConfig, StoreConfig};
use crate::core::record::VersionedRecord;
use crate::core::temporal::Timestamp;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::storage::{BackendTransaction, FileBackend, MemoryBackend, PersistenceBackend};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

/// Temporal key-value store
#[derive(Clone)]
pub struct TemporalStore {
    backend: Arc<dyn PersistenceBackend>,
    retry: RetryPolicy,
}

impl TemporalStore {
    /// Create a store over an injected backend
    pub fn new(backend: Arc<dyn PersistenceBackend>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Create a store over a fresh in-memory backend
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), RetryPolicy::default())
    }

    /// Open the backend described by `config`
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend: Arc<dyn PersistenceBackend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
            BackendConfig::File {
                path,
                sync_on_commit,
            } => Arc::new(FileBackend::open(path, *sync_on_commit)?),
        };
        Ok(Self::new(backend, config.retry.clone()))
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Write `value` as the version of `key` at `timestamp`.
    ///
    /// Creates the version or overwrites its value. On success exactly one
    /// record exists for the pair. Losing a creation race to another writer is
    /// retried within the policy's budget and surfaces as
    /// [`Error::ConflictExhausted`] only once that budget is spent.
    #[instrument(skip(self, value), fields(value_len = value.len()))]
    pub async fn put(&self, key: &str, value: &str, timestamp: Timestamp) -> Result<VersionedRecord> {
        validate_put(key, value)?;

        let max_attempts = self.retry.max_attempts();
        let mut attempt = 1;
        loop {
            debug!(attempt, "starting put attempt");
            match self.attempt_put(key, value, timestamp).await {
                Ok(record) => return Ok(record),
                Err(e) if self.retry.should_retry(attempt, &e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "lost race creating version, retrying"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => {
                    error!(attempts = attempt, "conflict retries exhausted");
                    return Err(Error::ConflictExhausted {
                        key: key.to_string(),
                        timestamp,
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Value of `key` at `timestamp`: the version with the greatest timestamp
    /// at or before it, or `None` if the key has no such version.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str, timestamp: Timestamp) -> Result<Option<String>> {
        let record = self
            .backend
            .find_latest_at_or_before(key, timestamp)
            .await?;
        Ok(record.map(VersionedRecord::into_value))
    }

    /// Every version of `key`, oldest first
    pub async fn history(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        self.backend.history(key).await
    }

    /// One transactional read-modify-write attempt
    async fn attempt_put(&self, key: &str, value: &str, timestamp: Timestamp) -> Result<VersionedRecord> {
        let mut txn = self.backend.begin().await?;
        match upsert(txn.as_mut(), key, value, timestamp).await {
            Ok(record) => {
                txn.commit().await?;
                Ok(record)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn upsert(
    txn: &mut dyn BackendTransaction,
    key: &str,
    value: &str,
    timestamp: Timestamp,
) -> Result<VersionedRecord> {
    let record = match txn.find_exact(key, timestamp).await? {
        Some(mut existing) => {
            existing.set_value(value);
            existing
        }
        None => VersionedRecord::new(key, value, timestamp),
    };
    txn.save(record).await
}

fn validate_put(key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::Validation("key must not be empty".to_string()));
    }
    if value.is_empty() {
        return Err(Error::Validation("value must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ts(value: i64) -> Timestamp {
        Timestamp::new(value)
    }

    /// Lets a rival writer commit the same pair right before each of the
    /// first `races` inserts reaches the backend.
    struct RacingBackend {
        inner: MemoryBackend,
        races_left: Arc<AtomicU32>,
        begins: AtomicU32,
    }

    impl RacingBackend {
        fn new(races: u32) -> Self {
            Self {
                inner: MemoryBackend::new(),
                races_left: Arc::new(AtomicU32::new(races)),
                begins: AtomicU32::new(0),
            }
        }
    }

    struct RacingTransaction {
        inner: Box<dyn BackendTransaction>,
        backend: MemoryBackend,
        races_left: Arc<AtomicU32>,
    }

    #[async_trait]
    impl PersistenceBackend for RacingBackend {
        async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RacingTransaction {
                inner: self.inner.begin().await?,
                backend: self.inner.clone(),
                races_left: Arc::clone(&self.races_left),
            }))
        }

        async fn find_latest_at_or_before(
            &self,
            key: &str,
            timestamp: Timestamp,
        ) -> Result<Option<VersionedRecord>> {
            self.inner.find_latest_at_or_before(key, timestamp).await
        }

        async fn history(&self, key: &str) -> Result<Vec<VersionedRecord>> {
            self.inner.history(key).await
        }
    }

    #[async_trait]
    impl BackendTransaction for RacingTransaction {
        async fn find_exact(
            &mut self,
            key: &str,
            timestamp: Timestamp,
        ) -> Result<Option<VersionedRecord>> {
            self.inner.find_exact(key, timestamp).await
        }

        async fn save(&mut self, record: VersionedRecord) -> Result<VersionedRecord> {
            let race = !record.is_saved()
                && self
                    .races_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
            if race {
                let mut rival = self.backend.begin().await?;
                rival
                    .save(VersionedRecord::new(record.key(), "rival", record.timestamp()))
                    .await?;
                rival.commit().await?;
            }
            self.inner.save(record).await
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.inner.commit().await
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.inner.rollback().await
        }
    }

    /// Every insert loses, and the winner is never visible to reads.
    struct ContendedBackend {
        begins: AtomicU32,
    }

    struct ContendedTransaction;

    #[async_trait]
    impl PersistenceBackend for ContendedBackend {
        async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ContendedTransaction))
        }

        async fn find_latest_at_or_before(
            &self,
            _key: &str,
            _timestamp: Timestamp,
        ) -> Result<Option<VersionedRecord>> {
            Ok(None)
        }

        async fn history(&self, _key: &str) -> Result<Vec<VersionedRecord>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl BackendTransaction for ContendedTransaction {
        async fn find_exact(
            &mut self,
            _key: &str,
            _timestamp: Timestamp,
        ) -> Result<Option<VersionedRecord>> {
            Ok(None)
        }

        async fn save(&mut self, record: VersionedRecord) -> Result<VersionedRecord> {
            Err(Error::UniqueViolation {
                key: record.key().to_string(),
                timestamp: record.timestamp(),
            })
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    /// Storage that is down
    struct UnavailableBackend {
        begins: AtomicU32,
    }

    #[async_trait]
    impl PersistenceBackend for UnavailableBackend {
        async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
            self.begins.fetch_add(1, Ordering::SeqCst);
            Err(Error::Storage("connection refused".to_string()))
        }

        async fn find_latest_at_or_before(
            &self,
            _key: &str,
            _timestamp: Timestamp,
        ) -> Result<Option<VersionedRecord>> {
            Err(Error::Storage("connection refused".to_string()))
        }

        async fn history(&self, _key: &str) -> Result<Vec<VersionedRecord>> {
            Err(Error::Storage("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_put_then_get_at_same_timestamp() {
        let store = TemporalStore::in_memory();
        let record = store.put("key-1", "value-1", ts(123456789)).await.unwrap();

        assert!(record.id().is_some());
        assert_eq!(record.key(), "key-1");
        assert_eq!(record.value(), "value-1");
        assert_eq!(record.timestamp(), ts(123456789));
        assert_eq!(
            store.get("key-1", ts(123456789)).await.unwrap().as_deref(),
            Some("value-1")
        );
    }

    #[tokio::test]
    async fn test_point_in_time_lookup() {
        let store = TemporalStore::in_memory();
        store.put("k", "v1", ts(1000)).await.unwrap();
        store.put("k", "v2", ts(2000)).await.unwrap();
        store.put("k", "v3", ts(3000)).await.unwrap();

        assert_eq!(store.get("k", ts(2500)).await.unwrap().as_deref(), Some("v2"));
        assert_eq!(store.get("k", ts(500)).await.unwrap(), None);
        assert_eq!(store.get("k", ts(3000)).await.unwrap().as_deref(), Some("v3"));
        assert_eq!(store.get("k", ts(3001)).await.unwrap().as_deref(), Some("v3"));
    }

    #[tokio::test]
    async fn test_unknown_key_is_absent() {
        let store = TemporalStore::in_memory();
        assert_eq!(store.get("missing", ts(1000)).await.unwrap(), None);
        assert_eq!(store.get("missing", Timestamp::MAX).await.unwrap(), None);
        assert!(store.history("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_put_is_idempotent() {
        let store = TemporalStore::in_memory();
        let first = store.put("k", "v", ts(10)).await.unwrap();
        let second = store.put("k", "v", ts(10)).await.unwrap();

        assert_eq!(first.id(), second.id());
        let history = store.history("k").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value(), "v");
    }

    #[tokio::test]
    async fn test_last_write_overwrites_value() {
        let store = TemporalStore::in_memory();
        store.put("k", "a", ts(10)).await.unwrap();
        let record = store.put("k", "b", ts(10)).await.unwrap();

        assert_eq!(record.value(), "b");
        assert_eq!(store.get("k", ts(10)).await.unwrap().as_deref(), Some("b"));
        assert_eq!(store.history("k").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let store = TemporalStore::in_memory();
        store.put("b", "b-value", ts(100)).await.unwrap();

        store.put("a", "a1", ts(50)).await.unwrap();
        store.put("a", "a2", ts(100)).await.unwrap();
        store.put("a", "a3", ts(150)).await.unwrap();

        assert_eq!(store.get("b", ts(99)).await.unwrap(), None);
        assert_eq!(store.get("b", ts(100)).await.unwrap().as_deref(), Some("b-value"));
        assert_eq!(store.get("b", ts(1000)).await.unwrap().as_deref(), Some("b-value"));
    }

    #[tokio::test]
    async fn test_validation_rejects_before_backend() {
        let backend = Arc::new(UnavailableBackend {
            begins: AtomicU32::new(0),
        });
        let store = TemporalStore::new(backend.clone(), RetryPolicy::no_backoff());

        let err = store.put("", "v", ts(1)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = store.put("k", "", ts(1)).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(backend.begins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lost_race_is_retried_from_fresh_read() {
        let backend = Arc::new(RacingBackend::new(1));
        let store = TemporalStore::new(backend.clone(), RetryPolicy::no_backoff());

        let record = store.put("k", "mine", ts(10)).await.unwrap();

        assert_eq!(record.value(), "mine");
        assert_eq!(backend.begins.load(Ordering::SeqCst), 2);
        let history = store.history("k").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].value(), "mine");
        assert_eq!(history[0].id(), record.id());
    }

    #[tokio::test]
    async fn test_exhausted_budget_surfaces_conflict_exhausted() {
        let backend = Arc::new(ContendedBackend {
            begins: AtomicU32::new(0),
        });
        let store = TemporalStore::new(
            backend.clone(),
            RetryPolicy::no_backoff().with_max_attempts(4),
        );

        let err = store.put("k", "v", ts(10)).await.unwrap_err();
        match err {
            Error::ConflictExhausted {
                key,
                timestamp,
                attempts,
            } => {
                assert_eq!(key, "k");
                assert_eq!(timestamp, ts(10));
                assert_eq!(attempts, 4);
            }
            other => panic!("expected ConflictExhausted, got {other:?}"),
        }
        assert_eq!(backend.begins.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates_without_retry() {
        let backend = Arc::new(UnavailableBackend {
            begins: AtomicU32::new(0),
        });
        let store = TemporalStore::new(backend.clone(), RetryPolicy::no_backoff());

        let err = store.put("k", "v", ts(1)).await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(backend.begins.load(Ordering::SeqCst), 1);

        let err = store.get("k", ts(1)).await.unwrap_err();
        assert!(matches!(err, Error::Storage(ref msg) if msg == "connection refused"));
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = StoreConfig::default().with_data_dir(temp_dir.path());

        {
            let store = TemporalStore::open(&config).unwrap();
            store.put("k", "durable", ts(5)).await.unwrap();
        }

        let store = TemporalStore::open(&config).unwrap();
        assert_eq!(store.get("k", ts(6)).await.unwrap().as_deref(), Some("durable"));
        assert_eq!(store.retry_policy(), &RetryPolicy::default());
    }
}

//! Persistence backend: the storage capability the store is built on

use crate::core::record::VersionedRecord;
use crate::core::temporal::Timestamp;
use crate::error::Result;
use async_trait::async_trait;

/// Storage capability consumed by [`TemporalStore`](crate::store::TemporalStore).
///
/// Implementations must enforce uniqueness of (key, timestamp) themselves: a
/// second insert for an occupied pair fails with
/// [`Error::UniqueViolation`](crate::error::Error::UniqueViolation) at save or
/// commit time, never silently duplicates. Any storage technology honoring
/// that contract is substitutable.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Open a transaction scoping one read-modify-write attempt
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>>;

    /// Get the record with the greatest timestamp at or before `timestamp`
    async fn find_latest_at_or_before(
        &self,
        key: &str,
        timestamp: Timestamp,
    ) -> Result<Option<VersionedRecord>>;

    /// Get all versions of a key in ascending timestamp order
    async fn history(&self, key: &str) -> Result<Vec<VersionedRecord>>;
}

/// A single attempt's view of the backend.
///
/// Saves are staged and become visible to other readers only on
/// [`commit`](BackendTransaction::commit), which applies all of them or none.
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait BackendTransaction: Send {
    /// Get the record for exactly (key, timestamp), including writes staged in
    /// this transaction
    async fn find_exact(&mut self, key: &str, timestamp: Timestamp)
        -> Result<Option<VersionedRecord>>;

    /// Stage a record. Unsaved records are inserts and receive an id; saved
    /// records are value updates.
    async fn save(&mut self, record: VersionedRecord) -> Result<VersionedRecord>;

    /// Make staged writes durable and visible
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard staged writes
    async fn rollback(self: Box<Self>) -> Result<()>;
}

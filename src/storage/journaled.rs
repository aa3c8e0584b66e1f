//! Reference backends: a version table fronted by a write-ahead log.
//!
//! Transactions stage their writes locally. Commits are serialized by the
//! log mutex: under it a commit re-checks the (key, timestamp) uniqueness
//! constraint against committed state, logs the writes and only then takes
//! the table's write lock to apply them. A commit is either fully visible or
//! rejected with nothing changed, and readers only wait for the in-memory
//! apply, never for log I/O.

use crate::core::record::{RecordId, VersionedRecord};
use crate::core::temporal::Timestamp;
use crate::error::{Error, Result};
use crate::storage::backend::{BackendTransaction, PersistenceBackend};
use crate::storage::table::{StagedWrite, VersionTable};
use crate::storage::wal::{FileWal, NullWal, WriteAheadLog};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Volatile backend, state lives only as long as the process
pub type MemoryBackend = JournaledBackend<NullWal>;

/// Durable backend persisting every commit to a log file
pub type FileBackend = JournaledBackend<FileWal>;

struct Shared<W> {
    table: RwLock<VersionTable>,
    /// Held for the whole commit; only commits mutate `table`
    wal: Mutex<W>,
}

/// Backend combining a [`VersionTable`] with a [`WriteAheadLog`].
///
/// Cloning yields another handle to the same state.
pub struct JournaledBackend<W: WriteAheadLog> {
    shared: Arc<Shared<W>>,
}

impl<W: WriteAheadLog> Clone for JournaledBackend<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: WriteAheadLog + 'static> JournaledBackend<W> {
    /// Build a backend over `wal`, rebuilding committed state from its contents.
    pub fn with_wal(wal: W) -> Result<Self> {
        let mut table = VersionTable::new();
        let mut replayed = 0usize;
        for record in wal.replay()? {
            table.upsert(record);
            replayed += 1;
        }
        if replayed > 0 {
            info!(entries = replayed, records = table.len(), "replayed write-ahead log");
        }

        Ok(Self {
            shared: Arc::new(Shared {
                table: RwLock::new(table),
                wal: Mutex::new(wal),
            }),
        })
    }

    /// Number of committed records
    pub async fn len(&self) -> usize {
        self.shared.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.shared.table.read().await.is_empty()
    }
}

impl JournaledBackend<NullWal> {
    /// Create an empty in-memory backend
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                table: RwLock::new(VersionTable::new()),
                wal: Mutex::new(NullWal),
            }),
        }
    }
}

impl Default for JournaledBackend<NullWal> {
    fn default() -> Self {
        Self::new()
    }
}

impl JournaledBackend<FileWal> {
    /// Open (or create) a durable backend stored in the log file at `path`
    pub fn open<P: AsRef<Path>>(path: P, sync_on_commit: bool) -> Result<Self> {
        let wal = FileWal::open(path.as_ref(), sync_on_commit)?;
        info!(path = %path.as_ref().display(), sync_on_commit, "opened file backend");
        Self::with_wal(wal)
    }
}

#[async_trait]
impl<W: WriteAheadLog + 'static> PersistenceBackend for JournaledBackend<W> {
    async fn begin(&self) -> Result<Box<dyn BackendTransaction>> {
        Ok(Box::new(JournaledTransaction {
            shared: Arc::clone(&self.shared),
            staged: Vec::new(),
        }))
    }

    async fn find_latest_at_or_before(
        &self,
        key: &str,
        timestamp: Timestamp,
    ) -> Result<Option<VersionedRecord>> {
        let table = self.shared.table.read().await;
        Ok(table.latest_at_or_before(key, timestamp).cloned())
    }

    async fn history(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        Ok(self.shared.table.read().await.history(key))
    }
}

/// Transaction over a [`JournaledBackend`]
pub struct JournaledTransaction<W: WriteAheadLog> {
    shared: Arc<Shared<W>>,
    staged: Vec<StagedWrite>,
}

impl<W: WriteAheadLog> JournaledTransaction<W> {
    fn staged_position(&self, key: &str, timestamp: Timestamp) -> Option<usize> {
        self.staged.iter().position(|write| {
            let record = write.record();
            record.key() == key && record.timestamp() == timestamp
        })
    }
}

#[async_trait]
impl<W: WriteAheadLog + 'static> BackendTransaction for JournaledTransaction<W> {
    async fn find_exact(
        &mut self,
        key: &str,
        timestamp: Timestamp,
    ) -> Result<Option<VersionedRecord>> {
        if let Some(pos) = self.staged_position(key, timestamp) {
            return Ok(Some(self.staged[pos].record().clone()));
        }
        let table = self.shared.table.read().await;
        Ok(table.find_exact(key, timestamp).cloned())
    }

    async fn save(&mut self, record: VersionedRecord) -> Result<VersionedRecord> {
        let staged = self.staged_position(record.key(), record.timestamp());

        if !record.is_saved() {
            let occupied = staged.is_some()
                || self
                    .shared
                    .table
                    .read()
                    .await
                    .find_exact(record.key(), record.timestamp())
                    .is_some();
            if occupied {
                return Err(Error::UniqueViolation {
                    key: record.key().to_string(),
                    timestamp: record.timestamp(),
                });
            }
            let record = record.with_id(RecordId::new());
            self.staged.push(StagedWrite::Insert(record.clone()));
            return Ok(record);
        }

        match staged {
            Some(pos) => {
                self.staged[pos] = match &self.staged[pos] {
                    StagedWrite::Insert(_) => StagedWrite::Insert(record.clone()),
                    StagedWrite::Update(_) => StagedWrite::Update(record.clone()),
                };
            }
            None => self.staged.push(StagedWrite::Update(record.clone())),
        }
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let JournaledTransaction { shared, staged } = *self;
        if staged.is_empty() {
            return Ok(());
        }

        let mut wal = shared.wal.lock().await;

        {
            let table = shared.table.read().await;
            for write in &staged {
                table.check(write)?;
            }
        }

        let records: Vec<VersionedRecord> =
            staged.iter().map(|write| write.record().clone()).collect();
        wal.append(&records)?;

        let count = staged.len();
        let mut table = shared.table.write().await;
        for write in staged {
            table.apply(write);
        }
        debug!(writes = count, "committed transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        if !self.staged.is_empty() {
            debug!(writes = self.staged.len(), "rolled back transaction");
        }
        Ok(())
    }
}

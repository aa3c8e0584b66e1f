//! Committed version table shared by the reference backends.

use crate::core::record::VersionedRecord;
use crate::core::temporal::Timestamp;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// A write staged by a transaction, waiting for commit.
#[derive(Debug, Clone)]
pub enum StagedWrite {
    /// First record for its (key, timestamp) pair
    Insert(VersionedRecord),
    /// New value for a record that was already committed
    Update(VersionedRecord),
}

impl StagedWrite {
    pub fn record(&self) -> &VersionedRecord {
        match self {
            StagedWrite::Insert(record) | StagedWrite::Update(record) => record,
        }
    }

    pub fn into_record(self) -> VersionedRecord {
        match self {
            StagedWrite::Insert(record) | StagedWrite::Update(record) => record,
        }
    }
}

/// Committed records, indexed by key then timestamp.
///
/// At most one record exists per (key, timestamp); records are never removed.
#[derive(Debug, Default)]
pub struct VersionTable {
    versions: HashMap<String, BTreeMap<Timestamp, VersionedRecord>>,
    len: usize,
}

impl VersionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records across all keys
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn find_exact(&self, key: &str, timestamp: Timestamp) -> Option<&VersionedRecord> {
        self.versions.get(key)?.get(&timestamp)
    }

    pub fn latest_at_or_before(&self, key: &str, timestamp: Timestamp) -> Option<&VersionedRecord> {
        self.versions
            .get(key)?
            .range(..=timestamp)
            .next_back()
            .map(|(_, record)| record)
    }

    pub fn history(&self, key: &str) -> Vec<VersionedRecord> {
        self.versions
            .get(key)
            .map(|timeline| timeline.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Check a staged write against committed state without applying it.
    pub fn check(&self, write: &StagedWrite) -> Result<()> {
        let record = write.record();
        match write {
            StagedWrite::Insert(_) => {
                if self.find_exact(record.key(), record.timestamp()).is_some() {
                    return Err(Error::UniqueViolation {
                        key: record.key().to_string(),
                        timestamp: record.timestamp(),
                    });
                }
            }
            StagedWrite::Update(_) => {
                let committed = self.find_exact(record.key(), record.timestamp());
                if committed.map(|c| c.id()) != Some(record.id()) {
                    return Err(Error::Storage(format!(
                        "update targets record {:?} for key {:?} at {} which is not committed",
                        record.id(),
                        record.key(),
                        record.timestamp()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Apply a write that already passed [`check`](Self::check).
    pub fn apply(&mut self, write: StagedWrite) {
        match write {
            StagedWrite::Insert(record) => self.upsert(record),
            StagedWrite::Update(record) => {
                match self
                    .versions
                    .get_mut(record.key())
                    .and_then(|timeline| timeline.get_mut(&record.timestamp()))
                {
                    Some(existing) => existing.set_value(record.into_value()),
                    None => self.upsert(record),
                }
            }
        }
    }

    /// Insert or overwrite the record for its (key, timestamp) pair.
    ///
    /// Used directly when replaying a log, where later entries win.
    pub fn upsert(&mut self, record: VersionedRecord) {
        let timeline = self.versions.entry(record.key().to_string()).or_default();
        if timeline.insert(record.timestamp(), record).is_none() {
            self.len += 1;
        }
    }
}

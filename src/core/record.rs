//! Versioned records

use crate::core::temporal::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Backend-assigned record identifier.
///
/// Opaque metadata: the identity that matters is the (key, timestamp) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generate a new record ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One version of a key: the value it held at a logical timestamp.
///
/// `key` and `timestamp` are fixed at construction; only the value can be
/// replaced, and only by a later write to the same (key, timestamp) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedRecord {
    id: Option<RecordId>,
    key: String,
    value: String,
    timestamp: Timestamp,
}

impl VersionedRecord {
    /// Create an unsaved record. The backend assigns its id on save.
    pub fn new(key: impl Into<String>, value: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            id: None,
            key: key.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// Attach a backend-assigned id
    pub(crate) fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn id(&self) -> Option<RecordId> {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Whether the record has been persisted at least once
    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }

    /// Replace the value in place
    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    /// Consume the record, returning its value
    pub fn into_value(self) -> String {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_unsaved() {
        let record = VersionedRecord::new("user:1", "active", Timestamp::new(1000));
        assert!(record.id().is_none());
        assert!(!record.is_saved());
        assert_eq!(record.key(), "user:1");
        assert_eq!(record.value(), "active");
        assert_eq!(record.timestamp(), Timestamp::new(1000));
    }

    #[test]
    fn test_set_value_keeps_identity() {
        let id = RecordId::new();
        let mut record = VersionedRecord::new("user:1", "active", Timestamp::new(1000)).with_id(id);
        record.set_value("inactive");

        assert_eq!(record.id(), Some(id));
        assert_eq!(record.key(), "user:1");
        assert_eq!(record.timestamp(), Timestamp::new(1000));
        assert_eq!(record.into_value(), "inactive");
    }

    #[test]
    fn test_record_json_shape() {
        let record = VersionedRecord::new("k", "v", Timestamp::new(5));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": null, "key": "k", "value": "v", "timestamp": 5})
        );
    }
}

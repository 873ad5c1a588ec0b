use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::types::{PutOutcome, Record};

/// In-memory key-value map with conflict-aware writes.
///
/// Writes follow last-writer-wins: an incoming record replaces the stored
/// one only when its `metadata.timestamp` is strictly greater. A write
/// with an equal or older timestamp is a no-op, which makes replication
/// deliveries idempotent and reordering-safe.
pub struct LocalStore {
    records: DashMap<String, Record>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Stores `record` under `key` unless an equally new or newer record
    /// is already present. Never fails; the outcome says what happened.
    ///
    /// The entry API holds the key's shard lock across the compare and
    /// the insert, so concurrent puts on one key are linearized.
    pub fn put(&self, key: &str, record: Record) -> PutOutcome {
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if record.metadata.timestamp > existing.get().metadata.timestamp {
                    existing.insert(record);
                    PutOutcome::Written
                } else {
                    PutOutcome::SkippedOlder
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                PutOutcome::Written
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<Record> {
        self.records.get(key).map(|entry| entry.value().clone())
    }

    /// Enumerates stored keys. Diagnostics only.
    pub fn keys(&self) -> Vec<String> {
        self.records.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

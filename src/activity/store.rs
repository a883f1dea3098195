//! Caller-side transfer store.
//!
//! The hub relays batches unchanged; keeping one record per transfer is
//! the consumer's job. [`TransferStore`] does that by merging batches on
//! `uuid`, newest fields winning.

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;

use crate::protocol::TransferRecord;

// ============================================================================
// TransferStore
// ============================================================================

/// Transfers keyed by `uuid`, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct TransferStore {
    records: FxHashMap<String, TransferRecord>,
    order: Vec<String>,
}

impl TransferStore {
    /// Creates an empty store.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch. Fields of an existing record are overwritten by the
    /// incoming ones; fields absent from the incoming record are kept.
    pub fn merge(&mut self, batch: &[TransferRecord]) {
        for record in batch {
            match self.records.get_mut(&record.uuid) {
                Some(existing) => {
                    for (key, value) in &record.fields {
                        existing.fields.insert(key.clone(), value.clone());
                    }
                }
                None => {
                    self.order.push(record.uuid.clone());
                    self.records.insert(record.uuid.clone(), record.clone());
                }
            }
        }
    }

    /// Drops every record of `batch` from the store.
    pub fn remove(&mut self, batch: &[TransferRecord]) {
        let mut changed = false;
        for record in batch {
            changed |= self.records.remove(&record.uuid).is_some();
        }
        if changed {
            let records = &self.records;
            self.order.retain(|uuid| records.contains_key(uuid));
        }
    }

    /// Gets a record by uuid.
    #[inline]
    #[must_use]
    pub fn get(&self, uuid: &str) -> Option<&TransferRecord> {
        self.records.get(uuid)
    }

    /// Iterates records in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &TransferRecord> {
        self.order.iter().filter_map(|uuid| self.records.get(uuid))
    }

    /// Returns the number of stored transfers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the store is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

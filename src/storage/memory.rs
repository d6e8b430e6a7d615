use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::contracts::{
    CounterKey, CounterRow, CounterStore, IdentifierIndex, SequenceType, StorageError,
    WriteOutcome,
};

/// In-process counter store and identifier index.
///
/// Every conditional write runs under the DashMap shard lock of its key, so the
/// compare and the swap cannot interleave with another writer.
#[derive(Default)]
pub struct MemoryStore {
    counters: DashMap<CounterKey, CounterRow>,
    /// (collection, field) -> used values
    identifiers: DashMap<(String, String), HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of counter rows currently held.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }
}

impl CounterStore for MemoryStore {
    async fn find(&self, key: &CounterKey) -> Result<Option<CounterRow>, StorageError> {
        Ok(self.counters.get(key).map(|row| row.value().clone()))
    }

    async fn create_counter(
        &self,
        key: &CounterKey,
        initial_count: u64,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        match self.counters.entry(key.clone()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                let row = CounterRow::new(key.clone(), initial_count, at);
                slot.insert(row.clone());
                Ok(WriteOutcome::Applied(row))
            }
        }
    }

    async fn update_counter(
        &self,
        key: &CounterKey,
        expected_current_count: u64,
        new_count: u64,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        if new_count < expected_current_count {
            return Err(StorageError::InvariantViolation(format!(
                "counter {} cannot move backwards ({} -> {})",
                key, expected_current_count, new_count
            )));
        }

        let Some(mut row) = self.counters.get_mut(key) else {
            return Err(StorageError::CounterNotFound(key.to_string()));
        };

        if row.current_count != expected_current_count {
            return Ok(WriteOutcome::Conflict);
        }

        row.current_count = new_count;
        row.last_incremented_at = at;
        Ok(WriteOutcome::Applied(row.value().clone()))
    }

    async fn record_last_number(
        &self,
        key: &CounterKey,
        count: u64,
        number: &str,
    ) -> Result<(), StorageError> {
        let Some(mut row) = self.counters.get_mut(key) else {
            return Err(StorageError::CounterNotFound(key.to_string()));
        };
        if row.current_count == count {
            row.last_number = Some(number.to_string());
        }
        Ok(())
    }

    async fn list_counters(
        &self,
        sequence_type: Option<SequenceType>,
    ) -> Result<Vec<CounterRow>, StorageError> {
        let mut rows: Vec<CounterRow> = self
            .counters
            .iter()
            .filter(|row| sequence_type.is_none_or(|t| row.key.sequence_type == t))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}

impl IdentifierIndex for MemoryStore {
    async fn exists_with_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        let slot = (collection.to_string(), field.to_string());
        Ok(self
            .identifiers
            .get(&slot)
            .is_some_and(|values| values.contains(value)))
    }

    async fn record_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        self.identifiers
            .entry((collection.to_string(), field.to_string()))
            .or_default()
            .insert(value.to_string());
        Ok(())
    }
}

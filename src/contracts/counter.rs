use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::error::StorageError;
use crate::contracts::{CounterKey, SequenceType};

/// Durable per-period counter row.
///
/// # Invariants
/// - At most one row per [`CounterKey`]
/// - `current_count` never decreases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRow {
    pub key: CounterKey,
    pub current_count: u64,
    /// Last fully formatted number issued from this row. Diagnostic only.
    pub last_number: Option<String>,
    pub last_incremented_at: DateTime<Utc>,
}

impl CounterRow {
    pub fn new(key: CounterKey, current_count: u64, at: DateTime<Utc>) -> Self {
        Self {
            key,
            current_count,
            last_number: None,
            last_incremented_at: at,
        }
    }
}

/// Result of a conditional counter write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write took effect; carries the row as stored.
    Applied(CounterRow),
    /// Another writer got there first. Nothing was written.
    Conflict,
}

impl WriteOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, WriteOutcome::Conflict)
    }
}

/// Row store holding the counters.
///
/// There is no atomic increment: callers read with [`find`](Self::find) and
/// write back with [`update_counter`](Self::update_counter), which only
/// applies when the stored count still equals `expected_current_count`.
pub trait CounterStore: Send + Sync {
    /// Looks up the row for `key`.
    fn find(
        &self,
        key: &CounterKey,
    ) -> impl Future<Output = Result<Option<CounterRow>, StorageError>> + Send;

    /// Creates the row for `key`.
    /// Returns [`WriteOutcome::Conflict`] if a row for `key` already exists.
    fn create_counter(
        &self,
        key: &CounterKey,
        initial_count: u64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<WriteOutcome, StorageError>> + Send;

    /// Compare-and-swap of `current_count` from `expected_current_count` to `new_count`.
    /// Returns [`WriteOutcome::Conflict`] when the stored count has moved on.
    fn update_counter(
        &self,
        key: &CounterKey,
        expected_current_count: u64,
        new_count: u64,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<WriteOutcome, StorageError>> + Send;

    /// Stores `last_number` on the row without touching `current_count`.
    ///
    /// Only applied while the row still holds `count`; a later increment makes
    /// the write a no-op so `last_number` never lags behind `current_count`.
    fn record_last_number(
        &self,
        key: &CounterKey,
        count: u64,
        number: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Lists rows, optionally restricted to one sequence type, ordered by key.
    fn list_counters(
        &self,
        sequence_type: Option<SequenceType>,
    ) -> impl Future<Output = Result<Vec<CounterRow>, StorageError>> + Send;
}

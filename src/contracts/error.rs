use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

/// Errors surfaced by [`crate::generator::SequenceNumberGenerator`].
#[derive(Error, Debug)]
pub enum SequenceError {
    /// Unsupported `sequence_type` or `period_type`. Never retried.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The counter write lost every compare-and-swap round within the retry budget.
    #[error("Counter contention after {attempts} attempts: {reason}")]
    ConcurrencyConflict { attempts: usize, reason: String },

    /// The formatted number already exists in the business collection.
    #[error("Number {number} is already in use")]
    DuplicateIdentifier { number: String },

    #[error("Sequence overflow")]
    Overflow,

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SequenceError {
    /// True for conflicts the caller should answer by calling `generate` again.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            SequenceError::ConcurrencyConflict { .. } | SequenceError::DuplicateIdentifier { .. }
        )
    }

    /// True only for the duplicate-identifier case (`collision: true` on the wire).
    pub fn is_collision(&self) -> bool {
        matches!(self, SequenceError::DuplicateIdentifier { .. })
    }
}

/// Extension trait for converting lock errors to StorageError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StorageError.
    fn map_lock_err(self) -> Result<T, StorageError>;
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, StorageError> {
        self.map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Counter not found: {0}")]
    CounterNotFound(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

//! Runtime choice between the in-memory and RocksDB stores.

use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::contracts::{
    CounterKey, CounterRow, CounterStore, IdentifierIndex, SequenceType, StorageError,
    WriteOutcome,
};
use crate::storage::{MemoryStore, RocksDbStore};

/// Which store backs the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Volatile; counters reset on restart.
    Memory,
    /// Durable RocksDB database in `data_dir`.
    RocksDb { data_dir: PathBuf },
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::RocksDb {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StoreConfig {
    /// Reads:
    /// - `SEQMINT_STORAGE`: `rocksdb` (default) or `memory`
    /// - `SEQMINT_DATA_DIR`: RocksDB directory (default: ./data)
    pub fn from_env() -> Self {
        let memory = std::env::var("SEQMINT_STORAGE")
            .map(|v| v.eq_ignore_ascii_case("memory"))
            .unwrap_or(false);
        if memory {
            return Self::Memory;
        }

        let data_dir = std::env::var("SEQMINT_DATA_DIR").unwrap_or_else(|_| "./data".into());
        Self::RocksDb {
            data_dir: PathBuf::from(data_dir),
        }
    }
}

/// Unified store supporting both backends.
pub enum StoreBackend {
    Memory(MemoryStore),
    RocksDb(RocksDbStore),
}

impl StoreBackend {
    /// Opens the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        match config {
            StoreConfig::Memory => {
                tracing::warn!("Using in-memory counters; numbers restart after a restart");
                Ok(Self::Memory(MemoryStore::new()))
            }
            StoreConfig::RocksDb { data_dir } => Ok(Self::RocksDb(RocksDbStore::open(data_dir)?)),
        }
    }

    /// Short backend name for health and stats output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::RocksDb(_) => "rocksdb",
        }
    }
}

impl CounterStore for StoreBackend {
    async fn find(&self, key: &CounterKey) -> Result<Option<CounterRow>, StorageError> {
        match self {
            Self::Memory(s) => s.find(key).await,
            Self::RocksDb(s) => s.find(key).await,
        }
    }

    async fn create_counter(
        &self,
        key: &CounterKey,
        initial_count: u64,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        match self {
            Self::Memory(s) => s.create_counter(key, initial_count, at).await,
            Self::RocksDb(s) => s.create_counter(key, initial_count, at).await,
        }
    }

    async fn update_counter(
        &self,
        key: &CounterKey,
        expected_current_count: u64,
        new_count: u64,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        match self {
            Self::Memory(s) => {
                s.update_counter(key, expected_current_count, new_count, at)
                    .await
            }
            Self::RocksDb(s) => {
                s.update_counter(key, expected_current_count, new_count, at)
                    .await
            }
        }
    }

    async fn record_last_number(
        &self,
        key: &CounterKey,
        count: u64,
        number: &str,
    ) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.record_last_number(key, count, number).await,
            Self::RocksDb(s) => s.record_last_number(key, count, number).await,
        }
    }

    async fn list_counters(
        &self,
        sequence_type: Option<SequenceType>,
    ) -> Result<Vec<CounterRow>, StorageError> {
        match self {
            Self::Memory(s) => s.list_counters(sequence_type).await,
            Self::RocksDb(s) => s.list_counters(sequence_type).await,
        }
    }
}

impl IdentifierIndex for StoreBackend {
    async fn exists_with_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        match self {
            Self::Memory(s) => s.exists_with_identifier(collection, field, value).await,
            Self::RocksDb(s) => s.exists_with_identifier(collection, field, value).await,
        }
    }

    async fn record_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        match self {
            Self::Memory(s) => s.record_identifier(collection, field, value).await,
            Self::RocksDb(s) => s.record_identifier(collection, field, value).await,
        }
    }
}

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rocksdb::{Direction, IteratorMode, Options, WriteOptions, DB};

use crate::contracts::{
    CounterKey, CounterRow, CounterStore, IdentifierIndex, LockResultExt, SequenceType,
    StorageError, WriteOutcome,
};

/// Key prefix for counter rows
const COUNTER_PREFIX: &str = "ctr";
/// Key prefix for business identifiers
const IDENT_PREFIX: &str = "ident";
/// Number of mutexes counter rows are striped over
const LOCK_STRIPES: usize = 64;

/// How far a write must reach before `put` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Durability {
    /// WAL fsynced; survives power loss.
    Synced,
    /// WAL left in the OS page cache; survives a process crash only.
    Buffered,
}

/// Acknowledged increments must never roll back, or a restart re-issues numbers.
const COUNTER_WRITES: Durability = Durability::Synced;
/// `last_number` and recorded identifiers.
const METADATA_WRITES: Durability = Durability::Buffered;

impl Durability {
    fn write_options(self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self == Durability::Synced);
        opts
    }
}

/// RocksDB-backed counter store and identifier index.
///
/// RocksDB has no conditional put, so every write to a counter row is a
/// read-compare-write done while holding the mutex of that row's stripe.
pub struct RocksDbStore {
    db: DB,
    /// Counter write locks, picked by key hash
    row_locks: [Mutex<()>; LOCK_STRIPES],
}

impl RocksDbStore {
    /// Opens or creates a RocksDB store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        // Counter rows are tiny; a small write buffer keeps memory flat.
        opts.set_write_buffer_size(8 * 1024 * 1024);
        opts.set_wal_dir(path.join("wal"));

        let db = DB::open(&opts, path).map_err(|e| StorageError::RocksDb(e.to_string()))?;
        tracing::info!(path = %path.display(), "Opened counter store");

        Ok(Self {
            db,
            row_locks: std::array::from_fn(|_| Mutex::new(())),
        })
    }

    /// Creates a counter key.
    /// Format: ctr:{sequence_type}:{period_type}:{period_key}
    fn counter_key(key: &CounterKey) -> String {
        format!(
            "{}:{}:{}:{}",
            COUNTER_PREFIX, key.sequence_type, key.period_type, key.period_key
        )
    }

    /// Creates a key prefix for listing counters.
    fn counter_prefix(sequence_type: Option<SequenceType>) -> String {
        match sequence_type {
            Some(t) => format!("{}:{}:", COUNTER_PREFIX, t),
            None => format!("{}:", COUNTER_PREFIX),
        }
    }

    /// Creates an identifier key.
    /// Format: ident:{collection}:{field}:{value}
    fn identifier_key(collection: &str, field: &str, value: &str) -> String {
        format!("{}:{}:{}:{}", IDENT_PREFIX, collection, field, value)
    }

    fn stripe(key: &CounterKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % LOCK_STRIPES as u64) as usize
    }

    fn serialize_row(row: &CounterRow) -> Result<Vec<u8>, StorageError> {
        bincode::serialize(row).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn deserialize_row(bytes: &[u8]) -> Result<CounterRow, StorageError> {
        bincode::deserialize(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    fn get_row(&self, key: &CounterKey) -> Result<Option<CounterRow>, StorageError> {
        match self.db.get(Self::counter_key(key).as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::deserialize_row(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(StorageError::RocksDb(e.to_string())),
        }
    }

    fn put_row(&self, row: &CounterRow, durability: Durability) -> Result<(), StorageError> {
        let bytes = Self::serialize_row(row)?;
        self.db
            .put_opt(
                Self::counter_key(&row.key).as_bytes(),
                bytes,
                &durability.write_options(),
            )
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }

    /// Runs `f` on the current row while holding the row's stripe lock.
    /// Keys sharing a stripe serialize; `f` must not take another row lock.
    fn with_row_locked<T>(
        &self,
        key: &CounterKey,
        f: impl FnOnce(Option<CounterRow>) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let _guard = self.row_locks[Self::stripe(key)].lock().map_lock_err()?;
        let current = self.get_row(key)?;
        f(current)
    }
}

impl CounterStore for RocksDbStore {
    async fn find(&self, key: &CounterKey) -> Result<Option<CounterRow>, StorageError> {
        self.get_row(key)
    }

    async fn create_counter(
        &self,
        key: &CounterKey,
        initial_count: u64,
        at: DateTime<Utc>,
    ) -> Result<WriteOutcome, StorageError> {
        self.with_row_locked(key, |current| {
            if current.is_some() {
                return Ok(WriteOutcome::Conflict);
            }
            let row = CounterRow::new(key.clone(), initial_count, at);
            self.put_row(&row, COUNTER_WRITES)?;
            Ok(WriteOutcome::Applied(row))
        })
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

        self.with_row_locked(key, |current| {
            let Some(mut row) = current else {
                return Err(StorageError::CounterNotFound(key.to_string()));
            };
            if row.current_count != expected_current_count {
                return Ok(WriteOutcome::Conflict);
            }
            row.current_count = new_count;
            row.last_incremented_at = at;
            self.put_row(&row, COUNTER_WRITES)?;
            Ok(WriteOutcome::Applied(row))
        })
    }

    async fn record_last_number(
        &self,
        key: &CounterKey,
        count: u64,
        number: &str,
    ) -> Result<(), StorageError> {
        self.with_row_locked(key, |current| {
            let Some(mut row) = current else {
                return Err(StorageError::CounterNotFound(key.to_string()));
            };
            if row.current_count != count {
                return Ok(());
            }
            row.last_number = Some(number.to_string());
            self.put_row(&row, METADATA_WRITES)
        })
    }

    async fn list_counters(
        &self,
        sequence_type: Option<SequenceType>,
    ) -> Result<Vec<CounterRow>, StorageError> {
        let prefix = Self::counter_prefix(sequence_type);
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut rows = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StorageError::RocksDb(e.to_string()))?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            rows.push(Self::deserialize_row(&value)?);
        }

        rows.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(rows)
    }
}

impl IdentifierIndex for RocksDbStore {
    async fn exists_with_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<bool, StorageError> {
        let key = Self::identifier_key(collection, field, value);
        self.db
            .get_pinned(key.as_bytes())
            .map(|v| v.is_some())
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }

    async fn record_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let key = Self::identifier_key(collection, field, value);
        self.db
            .put_opt(key.as_bytes(), b"", &METADATA_WRITES.write_options())
            .map_err(|e| StorageError::RocksDb(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::contracts::PeriodType;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksDbStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksDbStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn key(sequence_type: SequenceType, period_key: &str) -> CounterKey {
        CounterKey::new(sequence_type, PeriodType::Daily, period_key.into())
    }

    #[test]
    fn counter_key_format() {
        let k = key(SequenceType::Sale, "2025-01-16");
        assert_eq!(RocksDbStore::counter_key(&k), "ctr:sale:daily:2025-01-16");
        assert_eq!(
            RocksDbStore::counter_prefix(Some(SequenceType::Order)),
            "ctr:order:"
        );
    }

    #[tokio::test]
    async fn create_update_and_read_back() {
        let (store, _dir) = create_test_store();
        let k = key(SequenceType::Order, "2025-01-16");

        let created = store.create_counter(&k, 1, Utc::now()).await.unwrap();
        assert!(!created.is_conflict());

        let updated = store.update_counter(&k, 1, 2, Utc::now()).await.unwrap();
        assert!(matches!(updated, WriteOutcome::Applied(ref row) if row.current_count == 2));

        let row = store.find(&k).await.unwrap().unwrap();
        assert_eq!(row.current_count, 2);
        assert_eq!(row.key, k);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let (store, _dir) = create_test_store();
        let k = key(SequenceType::Order, "2025-01-16");
        store.create_counter(&k, 1, Utc::now()).await.unwrap();

        assert!(store
            .create_counter(&k, 1, Utc::now())
            .await
            .unwrap()
            .is_conflict());
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let (store, _dir) = create_test_store();
        let k = key(SequenceType::Order, "2025-01-16");
        store.create_counter(&k, 1, Utc::now()).await.unwrap();
        store.update_counter(&k, 1, 2, Utc::now()).await.unwrap();

        let outcome = store.update_counter(&k, 1, 2, Utc::now()).await.unwrap();
        assert!(outcome.is_conflict());
    }

    #[test]
    fn increments_are_synced_metadata_is_not() {
        assert_eq!(COUNTER_WRITES, Durability::Synced);
        assert_eq!(METADATA_WRITES, Durability::Buffered);
    }

    #[test]
    fn stripe_is_stable_and_in_range() {
        let k = key(SequenceType::Order, "2025-01-16");
        assert_eq!(RocksDbStore::stripe(&k), RocksDbStore::stripe(&k.clone()));

        let stripes: std::collections::HashSet<usize> = (1..=31)
            .map(|day| RocksDbStore::stripe(&key(SequenceType::Sale, &format!("2025-01-{day:02}"))))
            .collect();
        assert!(stripes.iter().all(|&s| s < LOCK_STRIPES));
        assert!(stripes.len() > 1);
    }

    #[tokio::test]
    async fn stale_last_number_is_ignored() {
        let (store, _dir) = create_test_store();
        let k = key(SequenceType::Order, "2025-01-16");
        store.create_counter(&k, 5, Utc::now()).await.unwrap();
        store.update_counter(&k, 5, 6, Utc::now()).await.unwrap();

        store.record_last_number(&k, 6, "WO-20250116-0006").await.unwrap();
        store.record_last_number(&k, 5, "WO-20250116-0005").await.unwrap();

        let row = store.find(&k).await.unwrap().unwrap();
        assert_eq!(row.current_count, 6);
        assert_eq!(row.last_number.as_deref(), Some("WO-20250116-0006"));
    }

    #[tokio::test]
    async fn counters_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let k = key(SequenceType::Sale, "2025-01-16");

        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            store.create_counter(&k, 1, Utc::now()).await.unwrap();
            store.update_counter(&k, 1, 2, Utc::now()).await.unwrap();
            store.record_last_number(&k, 2, "POS-20250116-0002").await.unwrap();
        }

        {
            let store = RocksDbStore::open(dir.path()).unwrap();
            let row = store.find(&k).await.unwrap().unwrap();
            assert_eq!(row.current_count, 2);
            assert_eq!(row.last_number.as_deref(), Some("POS-20250116-0002"));
        }
    }

    #[tokio::test]
    async fn list_is_scoped_by_prefix() {
        let (store, _dir) = create_test_store();
        store
            .create_counter(&key(SequenceType::Order, "2025-01-16"), 1, Utc::now())
            .await
            .unwrap();
        store
            .create_counter(&key(SequenceType::Sale, "2025-01-16"), 1, Utc::now())
            .await
            .unwrap();
        store
            .record_identifier("Order", "order_number", "WO-20250116-0001")
            .await
            .unwrap();

        assert_eq!(store.list_counters(None).await.unwrap().len(), 2);
        let sales = store.list_counters(Some(SequenceType::Sale)).await.unwrap();
        assert_eq!(sales.len(), 1);
        assert_eq!(sales[0].key.sequence_type, SequenceType::Sale);
    }

    #[tokio::test]
    async fn identifiers_round_trip() {
        let (store, _dir) = create_test_store();
        assert!(!store
            .exists_with_identifier("Sale", "sale_number", "POS-20250116-0001")
            .await
            .unwrap());

        store
            .record_identifier("Sale", "sale_number", "POS-20250116-0001")
            .await
            .unwrap();

        assert!(store
            .exists_with_identifier("Sale", "sale_number", "POS-20250116-0001")
            .await
            .unwrap());
    }

    #[test]
    fn concurrent_cas_never_double_applies() {
        use std::thread;

        let (store, _dir) = create_test_store();
        let store = Arc::new(store);
        let k = key(SequenceType::Order, "2025-01-16");
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(store.create_counter(&k, 0, Utc::now())).unwrap();

        // Every thread tries to move the counter from 0 to 1; exactly one may win.
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let k = k.clone();
                thread::spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .build()
                        .unwrap();
                    rt.block_on(store.update_counter(&k, 0, 1, Utc::now()))
                        .unwrap()
                })
            })
            .collect();

        let applied = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| !o.is_conflict())
            .count();
        assert_eq!(applied, 1);
    }
}

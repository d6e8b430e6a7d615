//! Restart tests for the RocksDB counter store.
//!
//! Counters, `last_number` and recorded identifiers must survive the process
//! going away, otherwise a restart would re-issue numbers.
//! Run with: cargo test --test crash_recovery_tests

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use seqmint::contracts::{
    CounterKey, CounterStore, IdentifierIndex, PeriodType, SequenceError, SequenceType,
};
use seqmint::generator::{ManualClock, SequenceNumberGenerator};
use seqmint::storage::RocksDbStore;

fn jan_16() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 16, 12, 0, 0).unwrap()
}

fn open_generator(
    dir: &std::path::Path,
    at: DateTime<Utc>,
) -> SequenceNumberGenerator<RocksDbStore, RocksDbStore> {
    let store = Arc::new(RocksDbStore::open(dir).expect("Failed to open store"));
    SequenceNumberGenerator::new(Arc::clone(&store), store)
        .with_clock(Arc::new(ManualClock::new(at)))
}

// =============================================================================
// Basic Recovery Tests
// =============================================================================

/// Counting resumes where it stopped after a clean shutdown.
#[tokio::test]
async fn counter_resumes_after_clean_restart() {
    let dir = TempDir::new().unwrap();

    // Phase 1: issue some numbers
    {
        let generator = open_generator(dir.path(), jan_16());
        for _ in 0..25 {
            generator
                .issue(SequenceType::Sale, PeriodType::Daily)
                .await
                .expect("issue should succeed");
        }
        // Store dropped here
    }

    // Phase 2: reopen and continue
    {
        let generator = open_generator(dir.path(), jan_16());
        let issued = generator
            .issue(SequenceType::Sale, PeriodType::Daily)
            .await
            .unwrap();
        assert_eq!(issued.count, 26);
        assert_eq!(issued.number, "POS-20250116-0026");
    }
}

#[tokio::test]
async fn last_number_survives_restart() {
    let dir = TempDir::new().unwrap();
    let key = CounterKey::for_instant(SequenceType::Order, PeriodType::Monthly, jan_16());

    {
        let generator = open_generator(dir.path(), jan_16());
        generator
            .issue(SequenceType::Order, PeriodType::Monthly)
            .await
            .unwrap();
        generator
            .issue(SequenceType::Order, PeriodType::Monthly)
            .await
            .unwrap();
    }

    let store = RocksDbStore::open(dir.path()).unwrap();
    let row = store.find(&key).await.unwrap().expect("row should exist");
    assert_eq!(row.current_count, 2);
    assert_eq!(row.last_number.as_deref(), Some("WO-202501-0002"));
    assert_eq!(row.last_incremented_at, jan_16());
}

#[tokio::test]
async fn recorded_identifiers_survive_restart() {
    let dir = TempDir::new().unwrap();

    {
        let store = RocksDbStore::open(dir.path()).unwrap();
        store
            .record_identifier("Order", "order_number", "WO-20250116-0001")
            .await
            .unwrap();
    }

    let generator = open_generator(dir.path(), jan_16());
    let err = generator
        .issue(SequenceType::Order, PeriodType::Daily)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SequenceError::DuplicateIdentifier { ref number } if number == "WO-20250116-0001"
    ));

    // The colliding call still consumed count 1.
    let issued = generator
        .issue(SequenceType::Order, PeriodType::Daily)
        .await
        .unwrap();
    assert_eq!(issued.count, 2);
}

// =============================================================================
// Period Tests
// =============================================================================

/// A restart on the next day starts a fresh counter and leaves the old row intact.
#[tokio::test]
async fn restart_into_new_period_starts_fresh_counter() {
    let dir = TempDir::new().unwrap();

    {
        let generator = open_generator(dir.path(), jan_16());
        for _ in 0..3 {
            generator
                .issue(SequenceType::Order, PeriodType::Daily)
                .await
                .unwrap();
        }
    }

    let next_day = jan_16() + chrono::Duration::days(1);
    let generator = open_generator(dir.path(), next_day);
    let issued = generator
        .issue(SequenceType::Order, PeriodType::Daily)
        .await
        .unwrap();
    assert_eq!(issued.number, "WO-20250117-0001");

    let rows = generator
        .counters()
        .list_counters(Some(SequenceType::Order))
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].key.period_key, "2025-01-16");
    assert_eq!(rows[0].current_count, 3);
    assert_eq!(rows[1].key.period_key, "2025-01-17");
}

/// Rows of other sequence types are untouched by restarts and listing filters.
#[tokio::test]
async fn list_filters_by_sequence_type_after_restart() {
    let dir = TempDir::new().unwrap();

    {
        let generator = open_generator(dir.path(), jan_16());
        for sequence_type in SequenceType::ALL {
            generator
                .issue(sequence_type, PeriodType::Yearly)
                .await
                .unwrap();
        }
    }

    let store = RocksDbStore::open(dir.path()).unwrap();
    let sales = store.list_counters(Some(SequenceType::Sale)).await.unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].key.sequence_type, SequenceType::Sale);
    assert_eq!(store.list_counters(None).await.unwrap().len(), 2);
}

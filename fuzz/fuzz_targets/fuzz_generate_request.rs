#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use seqmint::api::GenerateRequest;
use seqmint::generator::SequenceNumberGenerator;
use seqmint::storage::MemoryStore;

fuzz_target!(|data: &[u8]| {
    // Arbitrary request bodies must either be rejected or produce a well-formed number.
    let Ok(request) = serde_json::from_slice::<GenerateRequest>(data) else {
        return;
    };
    let Some(sequence_type) = request.sequence_type else {
        return;
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let store = Arc::new(MemoryStore::new());
    let generator = SequenceNumberGenerator::new(Arc::clone(&store), Arc::clone(&store));

    match rt.block_on(generator.generate(&sequence_type, request.period_type.as_deref())) {
        Ok(issued) => {
            assert_eq!(issued.count, 1);
            assert!(issued.number.starts_with(&issued.prefix));
            assert!(issued.number.ends_with("-0001"));
        }
        Err(e) => {
            assert!(!e.is_conflict());
            assert_eq!(store.counter_count(), 0);
        }
    }
});

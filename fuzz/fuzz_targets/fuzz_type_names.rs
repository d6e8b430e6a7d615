#![no_main]

use libfuzzer_sys::fuzz_target;
use seqmint::contracts::{PeriodType, SequenceType};

fuzz_target!(|data: &[u8]| {
    // Parsing must never panic, and anything accepted must round-trip through Display.
    let raw = String::from_utf8_lossy(data);

    if let Ok(sequence_type) = raw.parse::<SequenceType>() {
        assert_eq!(sequence_type.to_string(), raw);
    }
    if let Ok(period_type) = raw.parse::<PeriodType>() {
        assert_eq!(period_type.to_string(), raw);
    }
});

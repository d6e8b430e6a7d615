//! Latency histogram for `generate` calls.
//!
//! A call spans several store round-trips and possibly fixed retry pauses,
//! so bounds run from 50μs up to one second.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bounds of the finite buckets, in microseconds.
pub const BUCKET_BOUNDS_US: [u64; 12] = [
    50, 100, 250, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 250_000, 500_000, 1_000_000,
];

const FINITE: usize = BUCKET_BOUNDS_US.len();

/// Point-in-time copy of a [`Histogram`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramSnapshot {
    pub sum: u64,
    pub count: u64,
    /// Cumulative count per bound of [`BUCKET_BOUNDS_US`] (Prometheus `le` semantics)
    pub cumulative: [u64; FINITE],
}

/// Lock-free histogram. Each observation touches exactly one bucket; the
/// running totals are only folded together when read.
///
/// ```
/// use seqmint::metrics::Histogram;
///
/// let histogram = Histogram::new();
/// histogram.observe(150);
///
/// let snapshot = histogram.snapshot();
/// assert_eq!(snapshot.count, 1);
/// assert_eq!(snapshot.cumulative[2], 1);
/// ```
#[derive(Default)]
pub struct Histogram {
    sum: AtomicU64,
    count: AtomicU64,
    /// One slot per finite bound plus the overflow slot.
    slots: [AtomicU64; FINITE + 1],
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation in microseconds.
    #[inline]
    pub fn observe(&self, value_us: u64) {
        let slot = BUCKET_BOUNDS_US.partition_point(|&bound| bound < value_us);
        self.slots[slot].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        let mut cumulative = [0u64; FINITE];
        let mut running = 0;
        for (out, slot) in cumulative.iter_mut().zip(&self.slots) {
            running += slot.load(Ordering::Relaxed);
            *out = running;
        }

        HistogramSnapshot {
            sum: self.sum(),
            count: self.count(),
            cumulative,
        }
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    /// Prometheus text exposition of this histogram under `name`.
    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let snapshot = self.snapshot();

        let mut out = String::with_capacity(1024);
        let _ = writeln!(out, "# HELP {name} {help}");
        let _ = writeln!(out, "# TYPE {name} histogram");
        for (bound, total) in BUCKET_BOUNDS_US.iter().zip(snapshot.cumulative) {
            let _ = writeln!(out, "{name}_bucket{{le=\"{bound}\"}} {total}");
        }
        let _ = writeln!(out, "{name}_bucket{{le=\"+Inf\"}} {}", snapshot.count);
        let _ = writeln!(out, "{name}_sum {}", snapshot.sum);
        let _ = writeln!(out, "{name}_count {}", snapshot.count);
        out
    }
}

//! Counters describing how number generation behaves under load.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Histogram;

/// Central registry for seqmint metrics.
#[derive(Default)]
pub struct MetricsRegistry {
    pub generator: Arc<GeneratorMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formats all metrics in Prometheus exposition format.
    pub fn format_prometheus(&self) -> String {
        self.generator.format_prometheus()
    }
}

/// Outcomes of `generate` calls.
#[derive(Default)]
pub struct GeneratorMetrics {
    /// Numbers handed out successfully
    pub issued_total: AtomicU64,
    /// Requests rejected before touching the store
    pub validation_errors_total: AtomicU64,
    /// Counter writes retried after a lost compare-and-swap or store fault
    pub cas_retries_total: AtomicU64,
    /// Calls that ran out of counter write attempts
    pub conflicts_total: AtomicU64,
    /// Calls whose number already existed in the business collection
    pub collisions_total: AtomicU64,
    /// Swallowed `last_number` write failures
    pub last_number_errors_total: AtomicU64,
    /// End-to-end `generate` latency
    pub generate_duration_us: Histogram,
}

impl GeneratorMetrics {
    #[inline]
    pub fn record_issued(&self, duration_us: u64) {
        self.issued_total.fetch_add(1, Ordering::Relaxed);
        self.generate_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_validation_error(&self) {
        self.validation_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.cas_retries_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_conflict(&self, duration_us: u64) {
        self.conflicts_total.fetch_add(1, Ordering::Relaxed);
        self.generate_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_collision(&self, duration_us: u64) {
        self.collisions_total.fetch_add(1, Ordering::Relaxed);
        self.generate_duration_us.observe(duration_us);
    }

    #[inline]
    pub fn record_last_number_error(&self) {
        self.last_number_errors_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn format_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        let counters = [
            (
                "seqmint_issued_total",
                "Numbers issued successfully",
                &self.issued_total,
            ),
            (
                "seqmint_validation_errors_total",
                "Requests rejected for an invalid sequence or period type",
                &self.validation_errors_total,
            ),
            (
                "seqmint_cas_retries_total",
                "Counter writes retried after losing a compare-and-swap",
                &self.cas_retries_total,
            ),
            (
                "seqmint_conflicts_total",
                "Calls that exhausted the counter write budget",
                &self.conflicts_total,
            ),
            (
                "seqmint_collisions_total",
                "Calls whose number already existed in the business collection",
                &self.collisions_total,
            ),
            (
                "seqmint_last_number_errors_total",
                "Failed last_number metadata writes",
                &self.last_number_errors_total,
            ),
        ];

        for (name, help, value) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value.load(Ordering::Relaxed));
            output.push('\n');
        }

        output.push_str(&self.generate_duration_us.format_prometheus(
            "seqmint_generate_duration_us",
            "Latency of generate calls in microseconds",
        ));

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_each_outcome() {
        let m = GeneratorMetrics::default();
        m.record_issued(120);
        m.record_issued(80);
        m.record_conflict(300_000);
        m.record_collision(500);
        m.record_retry();
        m.record_validation_error();
        m.record_last_number_error();

        assert_eq!(m.issued_total.load(Ordering::Relaxed), 2);
        assert_eq!(m.conflicts_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.collisions_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.cas_retries_total.load(Ordering::Relaxed), 1);
        assert_eq!(m.generate_duration_us.count(), 4);
    }

    #[test]
    fn prometheus_output_lists_every_counter() {
        let registry = MetricsRegistry::new();
        registry.generator.record_issued(100);

        let output = registry.format_prometheus();
        assert!(output.contains("seqmint_issued_total 1"));
        assert!(output.contains("# TYPE seqmint_collisions_total counter"));
        assert!(output.contains("seqmint_last_number_errors_total 0"));
        assert!(output.contains("seqmint_generate_duration_us_count 1"));
    }
}

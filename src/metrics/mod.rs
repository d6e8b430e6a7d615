//! Observability metrics for seqmint.
//!
//! All metrics use lock-free atomics so recording never blocks a request.

pub mod histogram;
pub mod registry;

pub use histogram::{Histogram, HistogramSnapshot, BUCKET_BOUNDS_US};
pub use registry::{GeneratorMetrics, MetricsRegistry};

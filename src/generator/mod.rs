//! Human-readable order and sale numbers (`WO-20250116-0001`, `POS-202501-0007`).
//!
//! Each `(sequence_type, period_type, period_key)` has one counter row. A call
//! advances that row with a compare-and-swap write, retrying lost races within a
//! small fixed budget, then checks the formatted number against the business
//! collection before handing it out.

mod clock;
mod retry;

use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::Retryable;
use thiserror::Error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use retry::RetryConfig;

use crate::contracts::{
    CounterKey, CounterRow, CounterStore, IdentifierIndex, IssuedNumber, PeriodType,
    SequenceError, SequenceType, StorageError, WriteOutcome,
};
use crate::metrics::GeneratorMetrics;

/// Width the numeric suffix is zero-padded to. Larger counts widen the suffix.
pub const COUNT_WIDTH: usize = 4;

/// Formats `<prefix>-<date_part>-<count>` with the count padded to [`COUNT_WIDTH`].
pub fn format_number(prefix: &str, date_part: &str, count: u64) -> String {
    format!("{}-{}-{:0width$}", prefix, date_part, count, width = COUNT_WIDTH)
}

/// Failure of one counter write attempt.
#[derive(Debug, Error)]
enum AttemptError {
    #[error("counter {0} changed concurrently")]
    Lost(String),

    #[error(transparent)]
    Store(StorageError),

    #[error(transparent)]
    Fatal(SequenceError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        !matches!(self, AttemptError::Fatal(_))
    }
}

impl From<StorageError> for AttemptError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Serialization(_) | StorageError::InvariantViolation(_) => {
                AttemptError::Fatal(SequenceError::Storage(e))
            }
            other => AttemptError::Store(other),
        }
    }
}

/// Issues unique per-period numbers on top of a [`CounterStore`].
///
/// Holds no counts itself; every call goes to the store, so any number of
/// generators (or processes) may share one store.
pub struct SequenceNumberGenerator<C, I> {
    counters: Arc<C>,
    identifiers: Arc<I>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    metrics: Arc<GeneratorMetrics>,
}

impl<C: CounterStore, I: IdentifierIndex> SequenceNumberGenerator<C, I> {
    pub fn new(counters: Arc<C>, identifiers: Arc<I>) -> Self {
        Self {
            counters,
            identifiers,
            clock: Arc::new(SystemClock),
            retry: RetryConfig::default(),
            metrics: Arc::new(GeneratorMetrics::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<GeneratorMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn counters(&self) -> &Arc<C> {
        &self.counters
    }

    pub fn identifiers(&self) -> &Arc<I> {
        &self.identifiers
    }

    pub fn metrics(&self) -> &Arc<GeneratorMetrics> {
        &self.metrics
    }

    /// Validates the raw request fields and issues the next number.
    ///
    /// `period_type` defaults to daily. Invalid input fails before any store access.
    pub async fn generate(
        &self,
        sequence_type: &str,
        period_type: Option<&str>,
    ) -> Result<IssuedNumber, SequenceError> {
        let parsed = sequence_type.parse::<SequenceType>().and_then(|s| {
            let p = period_type
                .map(str::parse::<PeriodType>)
                .transpose()?
                .unwrap_or_default();
            Ok((s, p))
        });

        match parsed {
            Ok((s, p)) => self.issue(s, p).await,
            Err(e) => {
                self.metrics.record_validation_error();
                Err(e)
            }
        }
    }

    /// Issues the next number for the period containing the current time.
    pub async fn issue(
        &self,
        sequence_type: SequenceType,
        period_type: PeriodType,
    ) -> Result<IssuedNumber, SequenceError> {
        let start = Instant::now();
        let key = CounterKey::for_instant(sequence_type, period_type, self.clock.now());

        let row = match self.increment(&key).await {
            Ok(row) => row,
            Err(e) => {
                if e.is_conflict() {
                    self.metrics.record_conflict(elapsed_us(start));
                }
                return Err(e);
            }
        };

        let number = format_number(sequence_type.prefix(), &key.date_part(), row.current_count);
        self.record_last_number(&key, row.current_count, &number).await;

        let taken = self
            .identifiers
            .exists_with_identifier(
                sequence_type.collection(),
                sequence_type.identifier_field(),
                &number,
            )
            .await?;
        if taken {
            self.metrics.record_collision(elapsed_us(start));
            tracing::warn!(
                counter = %key,
                number = %number,
                collection = sequence_type.collection(),
                "Issued number already exists in business collection"
            );
            return Err(SequenceError::DuplicateIdentifier { number });
        }

        self.metrics.record_issued(elapsed_us(start));
        tracing::debug!(counter = %key, number = %number, "Issued number");

        Ok(IssuedNumber {
            number,
            count: row.current_count,
            period: key.period_key,
            prefix: sequence_type.prefix().to_string(),
        })
    }

    /// Current counter row for the period containing the current time, without advancing it.
    pub async fn peek(
        &self,
        sequence_type: SequenceType,
        period_type: PeriodType,
    ) -> Result<Option<CounterRow>, SequenceError> {
        let key = CounterKey::for_instant(sequence_type, period_type, self.clock.now());
        Ok(self.counters.find(&key).await?)
    }

    /// Advances the counter for `key`, retrying lost compare-and-swaps.
    async fn increment(&self, key: &CounterKey) -> Result<CounterRow, SequenceError> {
        let mut attempts = 0usize;

        let result = (|| {
            attempts += 1;
            self.try_increment(key)
        })
        .retry(self.retry.backoff())
        .when(|e: &AttemptError| e.is_retryable())
        .notify(|err: &AttemptError, dur: Duration| {
            self.metrics.record_retry();
            tracing::warn!(
                counter = %key,
                error = %err,
                retry_in = ?dur,
                "Counter write failed, retrying"
            );
        })
        .await;

        result.map_err(|e| match e {
            AttemptError::Fatal(e) => e,
            retryable => SequenceError::ConcurrencyConflict {
                attempts,
                reason: retryable.to_string(),
            },
        })
    }

    /// One read-then-conditional-write round.
    async fn try_increment(&self, key: &CounterKey) -> Result<CounterRow, AttemptError> {
        let now = self.clock.now();

        let outcome = match self.counters.find(key).await? {
            Some(row) => {
                let next = row
                    .current_count
                    .checked_add(1)
                    .ok_or(AttemptError::Fatal(SequenceError::Overflow))?;
                self.counters
                    .update_counter(key, row.current_count, next, now)
                    .await?
            }
            None => self.counters.create_counter(key, 1, now).await?,
        };

        match outcome {
            WriteOutcome::Applied(row) => Ok(row),
            WriteOutcome::Conflict => Err(AttemptError::Lost(key.to_string())),
        }
    }

    /// Stores `last_number` on the row. Failures are logged and dropped.
    async fn record_last_number(&self, key: &CounterKey, count: u64, number: &str) {
        if let Err(e) = self.counters.record_last_number(key, count, number).await {
            self.metrics.record_last_number_error();
            tracing::warn!(
                counter = %key,
                number = %number,
                error = %e,
                "Failed to record last_number"
            );
        }
    }
}

#[inline]
fn elapsed_us(start: Instant) -> u64 {
    start.elapsed().as_micros() as u64
}

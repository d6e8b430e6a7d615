use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contracts::error::SequenceError;

/// Logical namespace of a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequenceType {
    Order,
    Sale,
}

impl SequenceType {
    pub const ALL: [SequenceType; 2] = [SequenceType::Order, SequenceType::Sale];

    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceType::Order => "order",
            SequenceType::Sale => "sale",
        }
    }

    /// Prefix of every number issued for this sequence.
    pub fn prefix(&self) -> &'static str {
        match self {
            SequenceType::Order => "WO",
            SequenceType::Sale => "POS",
        }
    }

    /// Business collection whose records carry the issued numbers.
    pub fn collection(&self) -> &'static str {
        match self {
            SequenceType::Order => "Order",
            SequenceType::Sale => "Sale",
        }
    }

    /// Field of [`Self::collection`] that holds the issued number.
    pub fn identifier_field(&self) -> &'static str {
        match self {
            SequenceType::Order => "order_number",
            SequenceType::Sale => "sale_number",
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SequenceType {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(SequenceType::Order),
            "sale" => Ok(SequenceType::Sale),
            other => Err(SequenceError::Validation(format!(
                "Invalid sequence_type '{}'. Must be 'order' or 'sale'",
                other
            ))),
        }
    }
}

/// Granularity at which a counter resets.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    #[default]
    Daily,
    Monthly,
    Yearly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
            PeriodType::Yearly => "yearly",
        }
    }

    /// Period instance containing `now`, on UTC calendar boundaries.
    ///
    /// `YYYY-MM-DD`, `YYYY-MM` or `YYYY`.
    pub fn period_key(&self, now: DateTime<Utc>) -> String {
        let pattern = match self {
            PeriodType::Daily => "%Y-%m-%d",
            PeriodType::Monthly => "%Y-%m",
            PeriodType::Yearly => "%Y",
        };
        now.format(pattern).to_string()
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(PeriodType::Daily),
            "monthly" => Ok(PeriodType::Monthly),
            "yearly" => Ok(PeriodType::Yearly),
            other => Err(SequenceError::Validation(format!(
                "Invalid period_type '{}'. Must be 'daily', 'monthly' or 'yearly'",
                other
            ))),
        }
    }
}

/// Identity of one counter row: at most one row exists per key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CounterKey {
    pub sequence_type: SequenceType,
    pub period_type: PeriodType,
    pub period_key: String,
}

impl CounterKey {
    pub fn new(sequence_type: SequenceType, period_type: PeriodType, period_key: String) -> Self {
        Self {
            sequence_type,
            period_type,
            period_key,
        }
    }

    /// Key of the period containing `now`.
    pub fn for_instant(
        sequence_type: SequenceType,
        period_type: PeriodType,
        now: DateTime<Utc>,
    ) -> Self {
        Self::new(sequence_type, period_type, period_type.period_key(now))
    }

    /// `period_key` with separators removed: `YYYYMMDD`, `YYYYMM` or `YYYY`.
    pub fn date_part(&self) -> String {
        self.period_key.replace('-', "")
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.sequence_type, self.period_type, self.period_key
        )
    }
}

/// A successfully issued number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedNumber {
    pub number: String,
    pub count: u64,
    pub period: String,
    pub prefix: String,
}

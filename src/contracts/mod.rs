pub mod counter;
pub mod error;
pub mod identifiers;
pub mod sequence;

pub use counter::{CounterRow, CounterStore, WriteOutcome};
pub use error::{LockResultExt, SequenceError, StorageError};
pub use identifiers::IdentifierIndex;
pub use sequence::{CounterKey, IssuedNumber, PeriodType, SequenceType};

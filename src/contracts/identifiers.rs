use std::future::Future;

use crate::contracts::error::StorageError;

/// Lookup into the business collections (`Order`, `Sale`) that carry issued numbers.
///
/// The collections are written by other parts of the application; this
/// subsystem only reads them, apart from [`record_identifier`](Self::record_identifier)
/// which lets out-of-band writers (imports) register what they created.
pub trait IdentifierIndex: Send + Sync {
    /// True if any record of `collection` has `field == value`.
    fn exists_with_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Registers `value` as used in `collection.field`.
    fn record_identifier(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

// Remote table seam used by the cache

use crate::error::RemoteError;
use crate::filter::Filter;
use crate::record::{BuyerFields, BuyerRecord};

/// Table-row CRUD service the cache reads from and writes through
///
/// Rows come back without a derived search index; the cache computes it.
pub trait RemoteTable {
    /// All rows, in whatever order the backend returns them
    fn select_all(&self, table: &str) -> Result<Vec<BuyerRecord>, RemoteError>;

    /// First row matching the filter, if any
    fn find_by_field(&self, table: &str, filter: &Filter) -> Result<Option<BuyerRecord>, RemoteError>;

    /// Insert a row and return it with its assigned id
    fn insert(&self, table: &str, row: &BuyerFields) -> Result<BuyerRecord, RemoteError>;

    /// Replace the writable columns of row `id` and return the canonical row.
    /// Returns `RemoteError::NotFound` when no row has that id.
    fn update(&self, table: &str, id: i64, patch: &BuyerFields) -> Result<BuyerRecord, RemoteError>;

    /// Delete row `id`. Returns `RemoteError::NotFound` when no row has that id.
    fn delete(&self, table: &str, id: i64) -> Result<(), RemoteError>;
}

impl<T: RemoteTable + ?Sized> RemoteTable for Box<T> {
    fn select_all(&self, table: &str) -> Result<Vec<BuyerRecord>, RemoteError> {
        (**self).select_all(table)
    }

    fn find_by_field(&self, table: &str, filter: &Filter) -> Result<Option<BuyerRecord>, RemoteError> {
        (**self).find_by_field(table, filter)
    }

    fn insert(&self, table: &str, row: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        (**self).insert(table, row)
    }

    fn update(&self, table: &str, id: i64, patch: &BuyerFields) -> Result<BuyerRecord, RemoteError> {
        (**self).update(table, id, patch)
    }

    fn delete(&self, table: &str, id: i64) -> Result<(), RemoteError> {
        (**self).delete(table, id)
    }
}

/// Table and column names must be alphanumeric or `_`, at most 64 chars
pub(crate) fn validate_name(name: &str) -> Result<(), RemoteError> {
    if name.is_empty() || name.len() > 64 || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(RemoteError::InvalidName(name.to_string()));
    }
    Ok(())
}

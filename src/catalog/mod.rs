//! Catalog for managing tables, views and indexes.

mod schema;
mod transaction;

pub use schema::{
    Catalog, CatalogEntry, CatalogEntryKind, ColumnDef, IndexCatalogEntry, TableCatalogEntry,
    ViewCatalogEntry, DEFAULT_SCHEMA,
};
pub use transaction::{Timestamp, Transaction, TransactionManager};

use crate::error::Result;

/// Relation lookup used by the binder.
///
/// The returned entry is the version visible to `transaction`. A missing schema
/// or relation is a resolution error.
pub trait CatalogLookup {
    /// Looks up the table, view or other relation named `name` in `schema`.
    ///
    /// # Errors
    ///
    /// Returns a bind error if the schema or the relation does not exist.
    fn get_table_or_view(
        &self,
        transaction: &Transaction,
        schema: &str,
        name: &str,
    ) -> Result<CatalogEntry>;
}

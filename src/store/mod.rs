//! Store collaborator: the capabilities the ingestion engine needs from the target database.
//!
//! The engine only talks to [`Store`]. Two implementations ship with the crate:
//!
//! - [`postgres::PgStore`] (feature `postgres`, on by default): `COPY` for bulk loads,
//!   `UNNEST` batched inserts, one transaction per batch.
//! - [`memory::MemoryStore`]: in-process tables behind a strict loader, used for dry runs and
//!   tests.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use std::collections::BTreeMap;
use std::path::Path;

use crate::encoding::SourceEncoding;
use crate::error::StoreResult;
use crate::layout::TableDef;
use crate::types::{DecodedRow, Delimiter, Layout, LineTerminator};

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// Fixed-value overrides: column name → literal applied to every row of a file.
pub type Overrides = BTreeMap<String, String>;

/// Parameters of a store-native bulk load.
///
/// Literals (override values, delimiter, encoding) travel as data; each backend is responsible
/// for quoting or binding them.
#[derive(Debug, Clone)]
pub struct BulkLoadRequest<'a> {
    /// Source file.
    pub path: &'a Path,
    /// Target table.
    pub table: &'a str,
    /// Columns the file's fields map to, in order. Empty means "all table columns in order".
    pub columns: Vec<&'a str>,
    /// Character encoding of the file.
    pub encoding: SourceEncoding,
    /// Field delimiter.
    pub delimiter: Delimiter,
    /// Line terminator.
    pub line_terminator: LineTerminator,
    /// Leading lines to skip (the header).
    pub header_lines: usize,
    /// Constant values for columns not present in the file.
    pub overrides: &'a Overrides,
    /// Full table layout, when known. Gives override literals their column type.
    pub layout: Option<&'a Layout>,
}

/// Target of a batched insert: a table and the full layout every row follows.
#[derive(Debug, Clone, Copy)]
pub struct InsertTemplate<'a> {
    pub table: &'a str,
    pub layout: &'a Layout,
}

/// Operations the ingestion engine performs against the target store.
///
/// Calls are issued one at a time on a single handle; implementations need not be `Sync`.
#[allow(async_fn_in_trait)]
pub trait Store {
    /// Create the table if it does not exist. Must be idempotent.
    async fn ensure_table(&mut self, table: &TableDef) -> StoreResult<()>;

    /// Load a whole file in one store-side operation. Returns the number of rows loaded.
    ///
    /// Either every row is loaded or none is.
    async fn bulk_load(&mut self, request: &BulkLoadRequest<'_>) -> StoreResult<u64>;

    /// Insert one batch of rows atomically. Returns the number of rows inserted.
    async fn insert_batch(
        &mut self,
        template: &InsertTemplate<'_>,
        rows: &[DecodedRow],
    ) -> StoreResult<u64>;
}

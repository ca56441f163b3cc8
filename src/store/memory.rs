//! In-memory store with a strict bulk loader.
//!
//! The loader behaves like a database's native file loader: it parses the whole file up front
//! and rejects it on the first problem (encoding error, wrong field count, NUL byte, value that
//! does not fit its column). Nothing is written unless every row is valid.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use crate::error::{StoreError, StoreResult};
use crate::layout::TableDef;
use crate::types::{ColumnType, DecodedRow, Layout, LineTerminator, Value};

use super::{BulkLoadRequest, InsertTemplate, Store};

/// A table held by [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    layout: Layout,
    rows: Vec<Vec<Value>>,
}

impl MemoryTable {
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Values of one column across all rows.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.layout.index_of(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

/// In-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemoryTable>,
    deny_bulk: BTreeSet<String>,
    failing_batches: BTreeMap<String, usize>,
    bulk_attempts: BTreeMap<String, usize>,
    insert_calls: BTreeMap<String, usize>,
    tables_created: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every bulk load into `table`, as a server with local file loading disabled would.
    pub fn deny_bulk_load(mut self, table: impl Into<String>) -> Self {
        self.deny_bulk.insert(table.into());
        self
    }

    /// Make the `nth` (1-based) batch insert into `table` fail.
    pub fn fail_batch(mut self, table: impl Into<String>, nth: usize) -> Self {
        self.failing_batches.insert(table.into(), nth);
        self
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    /// Rows of `table`, or an empty slice when it does not exist.
    pub fn rows(&self, name: &str) -> &[Vec<Value>] {
        self.tables.get(name).map(|t| t.rows()).unwrap_or(&[])
    }

    /// Number of bulk loads attempted against `table`, including rejected ones.
    pub fn bulk_attempts(&self, table: &str) -> usize {
        self.bulk_attempts.get(table).copied().unwrap_or(0)
    }

    /// Number of `insert_batch` calls against `table`, including failed ones.
    pub fn insert_calls(&self, table: &str) -> usize {
        self.insert_calls.get(table).copied().unwrap_or(0)
    }

    /// Number of tables actually created (not counting no-op `ensure_table` calls).
    pub fn tables_created(&self) -> usize {
        self.tables_created
    }

    fn parse_file(&self, table: &MemoryTable, request: &BulkLoadRequest<'_>) -> StoreResult<Vec<Vec<Value>>> {
        let layout = &table.layout;

        let target_idxs: Vec<usize> = if request.columns.is_empty() {
            (0..layout.len()).collect()
        } else {
            request
                .columns
                .iter()
                .map(|name| {
                    layout.index_of(name).ok_or_else(|| {
                        StoreError::rejected(format!(
                            "column '{name}' of relation '{}' does not exist",
                            request.table
                        ))
                    })
                })
                .collect::<StoreResult<_>>()?
        };

        let mut fixed = Vec::with_capacity(request.overrides.len());
        for (column, literal) in request.overrides {
            let idx = layout
                .index_of(column)
                .ok_or_else(|| StoreError::InvalidOverride {
                    column: column.clone(),
                    message: format!("no such column in '{}'", request.table),
                })?;
            let value = parse_strict(&layout.columns[idx].column_type, literal).map_err(|message| {
                StoreError::InvalidOverride {
                    column: column.clone(),
                    message,
                }
            })?;
            fixed.push((idx, value));
        }

        let mut bytes = Vec::new();
        std::fs::File::open(request.path)?.read_to_end(&mut bytes)?;

        let mut body = bytes.as_slice();
        for _ in 0..request.header_lines {
            body = match body.iter().position(|&b| b == b'\n') {
                Some(i) => &body[i + 1..],
                None => &[],
            };
        }

        let text = request.encoding.decode_strict(body).ok_or_else(|| {
            StoreError::rejected(format!(
                "invalid byte sequence for encoding \"{}\"",
                request.encoding
            ))
        })?;
        if text.contains('\0') {
            return Err(StoreError::rejected("invalid byte sequence: 0x00"));
        }

        let terminator = match request.line_terminator {
            LineTerminator::Lf => csv::Terminator::Any(b'\n'),
            LineTerminator::CrLf => csv::Terminator::CRLF,
        };
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .delimiter(request.delimiter.as_byte())
            .terminator(terminator)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for (row_idx0, result) in rdr.records().enumerate() {
            // 1-based, counting the skipped header lines.
            let line = row_idx0 + 1 + request.header_lines;
            let record = result?;
            if record.len() != target_idxs.len() {
                return Err(StoreError::rejected(format!(
                    "line {line}: expected {} fields, found {}",
                    target_idxs.len(),
                    record.len()
                )));
            }

            let mut row = vec![Value::Null; layout.len()];
            for (raw, &idx) in record.iter().zip(target_idxs.iter()) {
                let column = &layout.columns[idx];
                row[idx] = parse_strict(&column.column_type, raw).map_err(|message| {
                    StoreError::rejected(format!(
                        "line {line}, column '{}': {message} (raw='{raw}')",
                        column.name
                    ))
                })?;
            }
            for (idx, value) in &fixed {
                row[*idx] = value.clone();
            }
            rows.push(row);
        }

        Ok(rows)
    }
}

/// Strict value parsing, the way a database loader treats text input.
///
/// `\N` is null; an empty integer is an error; codes longer than their width are an error.
fn parse_strict(column_type: &ColumnType, raw: &str) -> Result<Value, String> {
    if raw == "\\N" {
        return Ok(Value::Null);
    }

    match column_type {
        ColumnType::Integer => raw
            .parse::<i32>()
            .map(|v| Value::Int(i64::from(v)))
            .map_err(|_| format!("invalid input syntax for type integer: \"{raw}\"")),
        ColumnType::Text => Ok(Value::Text(raw.to_owned())),
        ColumnType::Code { width } => check_width(raw, *width).map(|_| Value::Text(raw.to_owned())),
    }
}

fn check_width(value: &str, width: u8) -> Result<(), String> {
    if value.chars().count() > usize::from(width) {
        Err(format!("value too long for type character({width})"))
    } else {
        Ok(())
    }
}

impl Store for MemoryStore {
    async fn ensure_table(&mut self, table: &TableDef) -> StoreResult<()> {
        if !self.tables.contains_key(&table.name) {
            log::debug!("creating in-memory table {}", table.name);
            self.tables.insert(
                table.name.clone(),
                MemoryTable {
                    layout: table.layout().clone(),
                    rows: Vec::new(),
                },
            );
            self.tables_created += 1;
        }
        Ok(())
    }

    async fn bulk_load(&mut self, request: &BulkLoadRequest<'_>) -> StoreResult<u64> {
        *self.bulk_attempts.entry(request.table.to_string()).or_default() += 1;

        if self.deny_bulk.contains(request.table) {
            return Err(StoreError::rejected("bulk loading is disabled for this table"));
        }

        let table = self
            .tables
            .get(request.table)
            .ok_or_else(|| StoreError::UnknownTable(request.table.to_string()))?;
        let rows = self.parse_file(table, request)?;
        let count = rows.len() as u64;

        if let Some(table) = self.tables.get_mut(request.table) {
            table.rows.extend(rows);
        }
        Ok(count)
    }

    async fn insert_batch(
        &mut self,
        template: &InsertTemplate<'_>,
        rows: &[DecodedRow],
    ) -> StoreResult<u64> {
        let calls = {
            let calls = self.insert_calls.entry(template.table.to_string()).or_default();
            *calls += 1;
            *calls
        };
        if self.failing_batches.get(template.table).copied() == Some(calls) {
            return Err(StoreError::rejected("connection reset during batch insert"));
        }

        let table = self
            .tables
            .get_mut(template.table)
            .ok_or_else(|| StoreError::UnknownTable(template.table.to_string()))?;

        for row in rows {
            if row.len() != table.layout.len() {
                return Err(StoreError::rejected(format!(
                    "row has {} values, table '{}' has {} columns",
                    row.len(),
                    template.table,
                    table.layout.len()
                )));
            }
            for (value, column) in row.values.iter().zip(&table.layout.columns) {
                if let (ColumnType::Code { width }, Value::Text(s)) = (&column.column_type, value) {
                    check_width(s, *width).map_err(StoreError::rejected)?;
                }
            }
        }

        table.rows.extend(rows.iter().map(|r| r.values.clone()));
        Ok(rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_strict_follows_loader_rules() {
        assert_eq!(parse_strict(&ColumnType::Integer, "42"), Ok(Value::Int(42)));
        assert_eq!(parse_strict(&ColumnType::Integer, "\\N"), Ok(Value::Null));
        assert!(parse_strict(&ColumnType::Integer, "").is_err());
        assert!(parse_strict(&ColumnType::Integer, " 4").is_err());
        assert_eq!(
            parse_strict(&ColumnType::Text, " padded "),
            Ok(Value::Text(" padded ".to_string()))
        );
        assert!(parse_strict(&ColumnType::Code { width: 2 }, "SPX").is_err());
    }
}

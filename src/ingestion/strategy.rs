//! Two-tier import of a single file: store-native bulk load first, tolerant row-by-row
//! decoding with batched inserts when the store rejects the bulk load.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use serde::Serialize;

use crate::layout::TableDef;
use crate::store::{BulkLoadRequest, InsertTemplate, Overrides, Store};
use crate::types::{DecodedRow, Delimiter};

use super::decode::{RowDecoder, RowError};
use super::driver::IngestionOptions;

/// Which path loaded a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPath {
    Bulk,
    RowByRow,
}

impl fmt::Display for ImportPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportPath::Bulk => f.write_str("bulk"),
            ImportPath::RowByRow => f.write_str("row-by-row"),
        }
    }
}

/// Why a file was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The bulk load failed and the table has no insert template for the fallback.
    UnsupportedTableForManualImport,
    /// A fixed-value override names a column the layout does not have.
    InvalidOverride { column: String },
    /// Reading the file failed during the fallback.
    Io { cause: String },
    /// A batch insert failed. `batch` is 1-based.
    Store { batch: usize, cause: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UnsupportedTableForManualImport => {
                f.write_str("manual import not supported for this table")
            }
            FailureReason::InvalidOverride { column } => {
                write!(f, "override column '{column}' is not part of the layout")
            }
            FailureReason::Io { cause } => write!(f, "io error: {cause}"),
            FailureReason::Store { batch, cause } => write!(f, "batch {batch} failed: {cause}"),
        }
    }
}

/// Terminal status of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImportStatus {
    Succeeded {
        rows: u64,
        path: ImportPath,
    },
    Failed {
        reason: FailureReason,
        /// Rows committed by earlier batches before the failure.
        committed_rows: u64,
    },
}

/// A line the row decoder skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowFailure {
    /// 1-based line number in the file (the header is line 1).
    pub line: usize,
    pub reason: String,
}

/// Result of importing one file. Exactly one per [`FileTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    /// File name (without directory).
    pub file: String,
    /// Target table.
    pub table: String,
    pub delimiter: Delimiter,
    pub status: ImportStatus,
    /// Why the bulk load was rejected, when the fallback ran.
    pub bulk_error: Option<String>,
    /// Lines the row decoder could not decode.
    pub skipped_rows: u64,
    /// The first few skipped lines, for triage.
    pub row_failures: Vec<RowFailure>,
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ImportStatus::Succeeded { .. })
    }

    /// Rows written to the store, including rows committed before a failure.
    pub fn rows_written(&self) -> u64 {
        match &self.status {
            ImportStatus::Succeeded { rows, .. } => *rows,
            ImportStatus::Failed { committed_rows, .. } => *committed_rows,
        }
    }

    pub fn path(&self) -> Option<ImportPath> {
        match &self.status {
            ImportStatus::Succeeded { path, .. } => Some(*path),
            ImportStatus::Failed { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            ImportStatus::Failed { reason, .. } => Some(reason),
            ImportStatus::Succeeded { .. } => None,
        }
    }
}

/// One discovered input file, resolved and sniffed.
#[derive(Debug, Clone)]
pub struct FileTask<'a> {
    pub path: PathBuf,
    pub file_name: String,
    pub table: String,
    pub delimiter: Delimiter,
    pub overrides: Overrides,
    /// Registry entry of `table`, `None` for tables the registry does not know.
    pub table_def: Option<&'a TableDef>,
}

impl FileTask<'_> {
    /// Columns the file's fields map to: the layout minus override columns. Empty for unknown
    /// tables, meaning "table order".
    pub fn source_columns(&self) -> Vec<&str> {
        match self.table_def {
            Some(def) => def
                .layout()
                .column_names()
                .filter(|name| !self.overrides.contains_key(*name))
                .collect(),
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RowTally {
    skipped: u64,
    samples: Vec<RowFailure>,
}

impl RowTally {
    fn record(&mut self, line: usize, err: &RowError, max_samples: usize) {
        self.skipped += 1;
        if self.samples.len() < max_samples {
            self.samples.push(RowFailure {
                line,
                reason: err.to_string(),
            });
        }
    }
}

enum ImportState {
    BulkAttempt,
    RowByRowFallback {
        bulk_error: String,
    },
    Done {
        status: ImportStatus,
        bulk_error: Option<String>,
        tally: RowTally,
    },
}

/// Import one file.
///
/// Never fails: every problem ends up in the returned outcome. A rejected bulk load leads to
/// exactly one row-by-row attempt.
pub async fn import_file<S: Store>(
    store: &mut S,
    task: &FileTask<'_>,
    options: &IngestionOptions,
) -> ImportOutcome {
    let mut state = ImportState::BulkAttempt;

    let (status, bulk_error, tally) = loop {
        state = match state {
            ImportState::BulkAttempt => match bulk_attempt(store, task, options).await {
                Ok(rows) => ImportState::Done {
                    status: ImportStatus::Succeeded {
                        rows,
                        path: ImportPath::Bulk,
                    },
                    bulk_error: None,
                    tally: RowTally::default(),
                },
                Err(err) => {
                    // Observers report the fallback at warn.
                    log::debug!(
                        "bulk load of {} into {} failed, falling back to row-by-row import: {err}",
                        task.file_name,
                        task.table
                    );
                    ImportState::RowByRowFallback {
                        bulk_error: err.to_string(),
                    }
                }
            },
            ImportState::RowByRowFallback { bulk_error } => {
                let (status, tally) = row_by_row(store, task, options).await;
                ImportState::Done {
                    status,
                    bulk_error: Some(bulk_error),
                    tally,
                }
            }
            ImportState::Done {
                status,
                bulk_error,
                tally,
            } => break (status, bulk_error, tally),
        };
    };

    ImportOutcome {
        file: task.file_name.clone(),
        table: task.table.clone(),
        delimiter: task.delimiter,
        status,
        bulk_error,
        skipped_rows: tally.skipped,
        row_failures: tally.samples,
    }
}

async fn bulk_attempt<S: Store>(
    store: &mut S,
    task: &FileTask<'_>,
    options: &IngestionOptions,
) -> crate::error::StoreResult<u64> {
    let request = BulkLoadRequest {
        path: &task.path,
        table: &task.table,
        columns: task.source_columns(),
        encoding: options.encoding,
        delimiter: task.delimiter,
        line_terminator: options.line_terminator,
        header_lines: 1,
        overrides: &task.overrides,
        layout: task.table_def.map(|def| def.layout()),
    };
    store.bulk_load(&request).await
}

async fn row_by_row<S: Store>(
    store: &mut S,
    task: &FileTask<'_>,
    options: &IngestionOptions,
) -> (ImportStatus, RowTally) {
    let mut tally = RowTally::default();
    let failed = |reason: FailureReason, committed_rows: u64| ImportStatus::Failed {
        reason,
        committed_rows,
    };

    let Some((def, template)) = task
        .table_def
        .and_then(|def| def.insert_template().map(|t| (def, t)))
    else {
        log::warn!(
            "row-by-row import is not supported for table {}, skipping {}",
            task.table,
            task.file_name
        );
        return (failed(FailureReason::UnsupportedTableForManualImport, 0), tally);
    };

    let decoder = match RowDecoder::new(def.layout(), &task.overrides, task.delimiter, options.encoding) {
        Ok(decoder) => decoder,
        Err(err) => {
            return (
                failed(FailureReason::InvalidOverride { column: err.column }, 0),
                tally,
            );
        }
    };

    let mut reader = match File::open(&task.path) {
        Ok(file) => BufReader::new(file),
        Err(err) => {
            return (failed(FailureReason::Io { cause: err.to_string() }, 0), tally);
        }
    };

    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<DecodedRow> = Vec::with_capacity(batch_size);
    let mut batches = 0usize;
    let mut committed = 0u64;
    let mut raw = Vec::new();
    let mut line_no = 0usize;

    loop {
        raw.clear();
        let n = match reader.read_until(b'\n', &mut raw) {
            Ok(n) => n,
            Err(err) => {
                return (failed(FailureReason::Io { cause: err.to_string() }, committed), tally);
            }
        };
        if n == 0 {
            break;
        }
        line_no += 1;
        if line_no == 1 {
            // header
            continue;
        }

        let line = trim_line_end(&raw);
        if line.is_empty() {
            continue;
        }

        match decoder.decode_raw(line) {
            Ok(row) => batch.push(row),
            Err(err) => {
                log::debug!("{}:{line_no}: skipping row: {err}", task.file_name);
                tally.record(line_no, &err, options.max_row_failure_samples);
            }
        }

        if batch.len() >= batch_size {
            batches += 1;
            match flush(store, &template, &mut batch).await {
                Ok(n) => committed += n,
                Err(cause) => {
                    return (failed(FailureReason::Store { batch: batches, cause }, committed), tally);
                }
            }
        }
    }

    if !batch.is_empty() {
        batches += 1;
        match flush(store, &template, &mut batch).await {
            Ok(n) => committed += n,
            Err(cause) => {
                return (failed(FailureReason::Store { batch: batches, cause }, committed), tally);
            }
        }
    }

    log::info!(
        "row-by-row import of {} finished: {committed} rows in {batches} batch(es), {} skipped",
        task.file_name,
        tally.skipped
    );

    (
        ImportStatus::Succeeded {
            rows: committed,
            path: ImportPath::RowByRow,
        },
        tally,
    )
}

async fn flush<S: Store>(
    store: &mut S,
    template: &InsertTemplate<'_>,
    batch: &mut Vec<DecodedRow>,
) -> Result<u64, String> {
    let result = store.insert_batch(template, batch).await;
    batch.clear();
    result.map_err(|err| err.to_string())
}

/// Strip trailing `\n` and `\r` bytes.
fn trim_line_end(raw: &[u8]) -> &[u8] {
    let end = raw
        .iter()
        .rposition(|&b| b != b'\n' && b != b'\r')
        .map_or(0, |i| i + 1);
    &raw[..end]
}

//! Run-level orchestration: enumerate a directory, resolve each file to a table, sniff its
//! delimiter, import it and collect the outcomes.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use glob::{MatchOptions, Pattern};
use serde::Serialize;

use crate::encoding::SourceEncoding;
use crate::error::{IngestionError, IngestionResult};
use crate::layout::LayoutRegistry;
use crate::store::{Overrides, Store};
use crate::types::LineTerminator;

use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, severity_for_failure,
};
use super::sniff::{SnifferConfig, sniff_delimiter};
use super::strategy::{FileTask, ImportOutcome, ImportStatus, import_file};

/// Options controlling an ingestion run.
///
/// Use [`Default`] for the DNE defaults.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Extension of input files, matched case-insensitively (default `TXT`).
    pub extension: String,
    /// Delimiter candidates and default.
    pub sniffer: SnifferConfig,
    /// Character encoding of the input files.
    pub encoding: SourceEncoding,
    /// Line terminator announced to the bulk loader.
    pub line_terminator: LineTerminator,
    /// Rows per insert on the row-by-row path.
    pub batch_size: usize,
    /// How many skipped lines per file are kept in [`ImportOutcome::row_failures`].
    pub max_row_failure_samples: usize,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("extension", &self.extension)
            .field("sniffer", &self.sniffer)
            .field("encoding", &self.encoding)
            .field("line_terminator", &self.line_terminator)
            .field("batch_size", &self.batch_size)
            .field("max_row_failure_samples", &self.max_row_failure_samples)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            extension: "TXT".to_string(),
            sniffer: SnifferConfig::default(),
            encoding: SourceEncoding::default(),
            line_terminator: LineTerminator::default(),
            batch_size: 1000,
            max_row_failure_samples: 20,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Target table of a file plus the overrides derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableResolution {
    pub table: String,
    pub overrides: Overrides,
}

/// Map a file name to its target table.
///
/// The upper-cased stem is used as is when the registry knows it. Otherwise a
/// `<FAMILY>_<REGION>` stem, where `FAMILY` has a region column and `REGION` is two ASCII
/// letters, resolves to `FAMILY` with the region as a fixed value. Anything else resolves to
/// the stem itself.
pub fn resolve_table(file_name: &str, registry: &LayoutRegistry) -> TableResolution {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_ascii_uppercase())
        .unwrap_or_default();

    if let Some(def) = registry.get(&stem) {
        return TableResolution {
            table: def.name.clone(),
            overrides: Overrides::new(),
        };
    }

    if let Some((family, region)) = stem.rsplit_once('_') {
        let is_region = region.len() == 2 && region.bytes().all(|b| b.is_ascii_alphabetic());
        if is_region {
            if let Some((def, column)) = registry
                .get(family)
                .and_then(|def| def.region_column.as_ref().map(|c| (def, c)))
            {
                let mut overrides = Overrides::new();
                overrides.insert(column.clone(), region.to_string());
                return TableResolution {
                    table: def.name.clone(),
                    overrides,
                };
            }
        }
    }

    TableResolution {
        table: stem,
        overrides: Overrides::new(),
    }
}

/// Create every registry table that does not exist yet. Safe to call on every run.
pub async fn ensure_schema<S: Store>(store: &mut S, registry: &LayoutRegistry) -> IngestionResult<()> {
    for table in registry.tables() {
        store
            .ensure_table(table)
            .await
            .map_err(|source| IngestionError::Schema {
                table: table.name.clone(),
                source,
            })?;
    }
    log::info!("schema ready ({} tables)", registry.len());
    Ok(())
}

/// Input files of `dir` with the given extension, sorted by file name.
pub fn discover_files(dir: &Path, extension: &str) -> IngestionResult<Vec<PathBuf>> {
    let pattern = Pattern::new(&format!("*.{}", Pattern::escape(extension)))?;
    let match_options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        if pattern.matches_with(&name.to_string_lossy(), match_options) {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Import every input file of `input_dir` into `store`.
///
/// Only a missing input directory or an unlistable one is fatal. Per-file problems are
/// recorded in the returned [`RunSummary`]; when an observer is configured it receives
/// `on_fallback`, `on_success`, `on_failure` and `on_alert` callbacks per file.
///
/// ```no_run
/// use dne_loader::ingestion::{IngestionOptions, run_ingestion};
/// use dne_loader::layout::LayoutRegistry;
/// use dne_loader::store::MemoryStore;
///
/// # async fn demo() -> Result<(), dne_loader::IngestionError> {
/// let registry = LayoutRegistry::dne();
/// let mut store = MemoryStore::new();
/// dne_loader::ingestion::ensure_schema(&mut store, &registry).await?;
/// let summary = run_ingestion(&mut store, &registry, "dne/", &IngestionOptions::default()).await?;
/// println!("{summary}");
/// # Ok(())
/// # }
/// ```
pub async fn run_ingestion<S: Store>(
    store: &mut S,
    registry: &LayoutRegistry,
    input_dir: impl AsRef<Path>,
    options: &IngestionOptions,
) -> IngestionResult<RunSummary> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(IngestionError::InputDirMissing(input_dir.to_path_buf()));
    }

    let files = discover_files(input_dir, &options.extension)?;
    log::info!(
        "found {} .{} file(s) in {}",
        files.len(),
        options.extension,
        input_dir.display()
    );

    let mut summary = RunSummary::new(input_dir);
    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_file() {
            log::warn!("{file_name} disappeared before it could be imported");
            summary.absent.push(file_name);
            continue;
        }

        let resolution = resolve_table(&file_name, registry);
        let detection = sniff_delimiter(&path, &options.sniffer, options.encoding);
        if let Some(fallback) = &detection.fallback {
            if detection.is_warning() {
                summary.warnings.push(format!("{file_name}: {fallback}"));
            } else {
                log::debug!("{file_name}: {fallback}, using '{}'", detection.delimiter);
            }
        }

        log::info!(
            "importing {file_name} into {} (delimiter '{}')",
            resolution.table,
            detection.delimiter
        );

        let task = FileTask {
            path: path.clone(),
            file_name,
            table_def: registry.get(&resolution.table),
            table: resolution.table,
            delimiter: detection.delimiter,
            overrides: resolution.overrides,
        };

        let outcome = import_file(store, &task, options).await;
        notify(options, &task, &outcome);
        summary.outcomes.push(outcome);
    }

    log::info!(
        "run finished: {} file(s), {} succeeded, {} failed, {} row(s) loaded",
        summary.total_files(),
        summary.succeeded(),
        summary.failed(),
        summary.rows_loaded()
    );
    Ok(summary)
}

fn notify(options: &IngestionOptions, task: &FileTask<'_>, outcome: &ImportOutcome) {
    let Some(obs) = options.observer.as_ref() else {
        return;
    };
    let ctx = IngestionContext {
        path: task.path.clone(),
        table: task.table.clone(),
        delimiter: task.delimiter,
    };

    if let Some(bulk_error) = &outcome.bulk_error {
        obs.on_fallback(&ctx, bulk_error);
    }

    match &outcome.status {
        ImportStatus::Succeeded { rows, path } => obs.on_success(
            &ctx,
            IngestionStats {
                rows: *rows,
                skipped_rows: outcome.skipped_rows,
                path: *path,
            },
        ),
        ImportStatus::Failed { reason, .. } => {
            let sev = severity_for_failure(reason);
            obs.on_failure(&ctx, sev, reason);
            if sev >= options.alert_at_or_above {
                obs.on_alert(&ctx, sev, reason);
            }
        }
    }
}

/// Everything a run did, file by file.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub input_dir: PathBuf,
    /// One outcome per imported file, in processing order.
    pub outcomes: Vec<ImportOutcome>,
    /// Files that were enumerated but gone when their turn came.
    pub absent: Vec<String>,
    /// Run-level warnings (unreadable files during sniffing).
    pub warnings: Vec<String>,
}

impl RunSummary {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            outcomes: Vec::new(),
            absent: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Files seen by the run, absent ones included.
    pub fn total_files(&self) -> usize {
        self.outcomes.len() + self.absent.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.outcomes.iter().map(ImportOutcome::rows_written).sum()
    }

    pub fn rows_skipped(&self) -> u64 {
        self.outcomes.iter().map(|o| o.skipped_rows).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    /// Outcome of the given file name, if it was imported.
    pub fn outcome(&self, file_name: &str) -> Option<&ImportOutcome> {
        self.outcomes.iter().find(|o| o.file == file_name)
    }

    /// Write the summary as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> IngestionResult<()> {
        let file = std::fs::File::create(path.as_ref())?;
        serde_json::to_writer_pretty(file, self).map_err(|e| IngestionError::Io(e.into()))
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input directory: {}", self.input_dir.display())?;
        writeln!(
            f,
            "files: {} | succeeded: {} | failed: {} | absent: {}",
            self.total_files(),
            self.succeeded(),
            self.failed(),
            self.absent.len()
        )?;
        writeln!(
            f,
            "rows loaded: {} | rows skipped: {}",
            self.rows_loaded(),
            self.rows_skipped()
        )?;

        for outcome in &self.outcomes {
            match &outcome.status {
                ImportStatus::Succeeded { rows, path } => {
                    write!(f, "  ok    {} -> {} ({rows} rows, {path})", outcome.file, outcome.table)?;
                    if outcome.skipped_rows > 0 {
                        write!(f, ", {} skipped", outcome.skipped_rows)?;
                    }
                    writeln!(f)?;
                }
                ImportStatus::Failed {
                    reason,
                    committed_rows,
                } => {
                    write!(f, "  FAIL  {} -> {}: {reason}", outcome.file, outcome.table)?;
                    if *committed_rows > 0 {
                        write!(f, " ({committed_rows} rows committed before the failure)")?;
                    }
                    writeln!(f)?;
                }
            }
        }
        for name in &self.absent {
            writeln!(f, "  gone  {name}")?;
        }
        for warning in &self.warnings {
            writeln!(f, "  warn  {warning}")?;
        }
        Ok(())
    }
}

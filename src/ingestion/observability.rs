use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Delimiter;

use super::strategy::{FailureReason, ImportPath};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (non-fatal).
    Warning,
    /// Error-level event (file not imported).
    Error,
    /// Critical error (typically I/O or other infrastructure failures).
    Critical,
}

/// Context about one file being imported.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// The input path.
    pub path: PathBuf,
    /// Resolved target table.
    pub table: String,
    /// Delimiter used for the file.
    pub delimiter: Delimiter,
}

/// Stats reported on a successful import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Rows written to the store.
    pub rows: u64,
    /// Lines skipped by the row decoder.
    pub skipped_rows: u64,
    /// Which path loaded the file.
    pub path: ImportPath,
}

/// Observer interface for per-file import outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a file was imported.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called when the bulk load was rejected and the row-by-row path takes over.
    fn on_fallback(&self, _ctx: &IngestionContext, _bulk_error: &str) {}

    /// Called when a file could not be imported.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _reason: &FailureReason) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        self.on_failure(ctx, severity, reason)
    }
}

/// Severity of a failed import.
pub fn severity_for_failure(reason: &FailureReason) -> IngestionSeverity {
    match reason {
        FailureReason::UnsupportedTableForManualImport => IngestionSeverity::Warning,
        FailureReason::InvalidOverride { .. } | FailureReason::Store { .. } => IngestionSeverity::Error,
        FailureReason::Io { .. } => IngestionSeverity::Critical,
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_fallback(&self, ctx: &IngestionContext, bulk_error: &str) {
        for o in &self.observers {
            o.on_fallback(ctx, bulk_error);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        for o in &self.observers {
            o.on_failure(ctx, severity, reason);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        for o in &self.observers {
            o.on_alert(ctx, severity, reason);
        }
    }
}

/// Forwards events to the `log` facade under the `dne_loader::events` target.
#[derive(Debug, Default)]
pub struct LogObserver;

const EVENT_TARGET: &str = "dne_loader::events";

impl IngestionObserver for LogObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        log::info!(
            target: EVENT_TARGET,
            "ok path={} table={} via={} rows={} skipped={}",
            ctx.path.display(),
            ctx.table,
            stats.path,
            stats.rows,
            stats.skipped_rows
        );
    }

    fn on_fallback(&self, ctx: &IngestionContext, bulk_error: &str) {
        log::warn!(
            target: EVENT_TARGET,
            "fallback path={} table={} bulk_err={}",
            ctx.path.display(),
            ctx.table,
            bulk_error
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        log::error!(
            target: EVENT_TARGET,
            "fail severity={:?} path={} table={} err={}",
            severity,
            ctx.path.display(),
            ctx.table,
            reason
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        log::error!(
            target: EVENT_TARGET,
            "ALERT severity={:?} path={} table={} err={}",
            severity,
            ctx.path.display(),
            ctx.table,
            reason
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "{} ok table={} path={} via={} rows={} skipped={}",
            unix_ts(),
            ctx.table,
            ctx.path.display(),
            stats.path,
            stats.rows,
            stats.skipped_rows
        ));
    }

    fn on_fallback(&self, ctx: &IngestionContext, bulk_error: &str) {
        self.append_line(&format!(
            "{} fallback table={} path={} delimiter={} bulk_err={}",
            unix_ts(),
            ctx.table,
            ctx.path.display(),
            ctx.delimiter,
            bulk_error
        ));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        self.append_line(&format!(
            "{} fail severity={:?} table={} path={} err={}",
            unix_ts(),
            severity,
            ctx.table,
            ctx.path.display(),
            reason
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, reason: &FailureReason) {
        self.append_line(&format!(
            "{} ALERT severity={:?} table={} path={} err={}",
            unix_ts(),
            severity,
            ctx.table,
            ctx.path.display(),
            reason
        ));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

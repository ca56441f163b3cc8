//! Ingestion engine.
//!
//! Most callers should use [`run_ingestion`] (from [`driver`]) which:
//!
//! - enumerates the input directory and resolves each file to a registry table
//! - sniffs the field delimiter of each file ([`sniff`])
//! - imports the file through the bulk path, falling back to [`decode`] + batched inserts
//!   ([`strategy`])
//! - optionally reports success/fallback/failure/alerts to an [`IngestionObserver`]

pub mod decode;
pub mod driver;
pub mod observability;
pub mod sniff;
pub mod strategy;

pub use decode::{InvalidOverride, RowDecoder, RowError, coerce};
pub use driver::{
    IngestionOptions, RunSummary, TableResolution, discover_files, ensure_schema, resolve_table,
    run_ingestion,
};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, LogObserver,
};
pub use sniff::{Detection, DetectionFallback, SnifferConfig, detect_in_line, sniff_delimiter};
pub use strategy::{
    FailureReason, FileTask, ImportOutcome, ImportPath, ImportStatus, RowFailure, import_file,
};

use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for run-level operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Convenience result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Fatal error that stops an ingestion run.
///
/// Per-file and per-row problems never surface here; they end up in the
/// [`crate::ingestion::RunSummary`].
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The input directory does not exist or is not a directory.
    #[error("input directory does not exist: {}", .0.display())]
    InputDirMissing(PathBuf),

    /// Creating a target table failed.
    #[error("failed to create table '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: StoreError,
    },

    /// The store could not be reached or prepared.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A layout document could not be loaded.
    #[error("invalid layout definition: {message}")]
    Layout { message: String },

    /// Invalid configuration value.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// The input file pattern could not be built.
    #[error("invalid input pattern: {0}")]
    Glob(#[from] glob::PatternError),

    /// Underlying I/O error (e.g. directory listing, report file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error reported by a [`crate::store::Store`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading the source file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The strict in-memory loader could not parse the file.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The target table does not exist in the store.
    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    /// The store refused the data (malformed rows, permission, encoding mismatch).
    #[error("rejected: {message}")]
    Rejected { message: String },

    /// An override names a column the table does not have, or its literal does not fit.
    #[error("invalid override for column '{column}': {message}")]
    InvalidOverride { column: String, message: String },

    /// Postgres error.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn rejected(message: impl Into<String>) -> Self {
        StoreError::Rejected {
            message: message.into(),
        }
    }
}

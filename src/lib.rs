//! `dne-loader` bulk-loads a directory of DNE-style delimited flat files into a relational store.
//!
//! Each file maps to a table described by a [`layout::TableDef`]. Per file, the engine detects
//! the field delimiter, resolves the target table (per-region shards such as
//! `LOG_LOGRADOURO_SP.TXT` merge into one table with the region filled from the file name),
//! tries a store-native bulk load and, when the store rejects it, degrades to tolerant
//! row-by-row decoding with batched inserts.
//!
//! The primary entrypoint is [`ingestion::run_ingestion`], written against the
//! [`store::Store`] trait. Two stores ship with the crate:
//!
//! - [`store::PgStore`] (feature `postgres`, on by default)
//! - [`store::MemoryStore`], an in-process store with a strict bulk loader
//!
//! ## Quick example
//!
//! ```no_run
//! use dne_loader::ingestion::{IngestionOptions, ensure_schema, run_ingestion};
//! use dne_loader::layout::LayoutRegistry;
//! use dne_loader::store::MemoryStore;
//!
//! # async fn demo() -> Result<(), dne_loader::IngestionError> {
//! let registry = LayoutRegistry::dne();
//! let mut store = MemoryStore::new();
//! ensure_schema(&mut store, &registry).await?;
//!
//! let summary = run_ingestion(&mut store, &registry, "/data/dne", &IngestionOptions::default()).await?;
//! for outcome in &summary.outcomes {
//!     println!("{} -> {}: {:?}", outcome.file, outcome.table, outcome.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: sniffing, row decoding, the import strategy and the run driver
//! - [`layout`]: table layouts and the built-in DNE registry
//! - [`store`]: the store trait and its backends
//! - [`types`]: column types, values, delimiters
//! - [`encoding`]: legacy source encodings
//! - [`config`]: command-line/environment configuration of the binary
//! - [`error`]: error types

pub mod config;
pub mod encoding;
pub mod error;
pub mod ingestion;
pub mod layout;
pub mod store;
pub mod types;

pub use error::{IngestionError, IngestionResult, StoreError, StoreResult};

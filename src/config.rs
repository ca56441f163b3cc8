//! Configuration of the `dne-loader` binary.
//!
//! Every setting can come from a command-line flag or an environment variable. The binary loads
//! a `.env` file (if present) before parsing, so `.env` entries act as defaults below real
//! environment variables and flags.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser};

use crate::encoding::SourceEncoding;
use crate::error::IngestionResult;
use crate::ingestion::{
    CompositeObserver, FileObserver, IngestionObserver, IngestionOptions, LogObserver,
    SnifferConfig,
};
use crate::layout::LayoutRegistry;
use crate::types::{Delimiter, LineTerminator};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "dne-loader",
    version,
    about = "Load a directory of DNE delimited flat files into Postgres"
)]
pub struct LoaderConfig {
    /// Directory holding the `.TXT` files.
    #[arg(long, env = "DNE_PATH")]
    pub input_dir: PathBuf,

    /// JSON layout file merged over the built-in DNE tables.
    #[arg(long)]
    pub layouts: Option<PathBuf>,

    /// Character encoding of the input files.
    #[arg(long, env = "DNE_ENCODING", default_value = "latin1", value_parser = parse_encoding)]
    pub encoding: SourceEncoding,

    /// Rows per insert when a file falls back to row-by-row import.
    #[arg(long, env = "DNE_BATCH_SIZE", default_value_t = 1000, value_parser = parse_batch_size)]
    pub batch_size: usize,

    /// Delimiter used when sniffing finds none (`;`, `,`, `|`, `@`, `tab`, ...).
    #[arg(long, default_value = ";", value_parser = parse_delimiter)]
    pub default_delimiter: Delimiter,

    /// Line terminator of the input files (`lf` or `crlf`).
    #[arg(long, default_value = "lf", value_parser = parse_line_terminator)]
    pub line_terminator: LineTerminator,

    /// Extension of the input files, matched case-insensitively.
    #[arg(long, default_value = "TXT")]
    pub extension: String,

    /// Write the run summary as JSON to this path.
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Append per-file events to this log file.
    #[arg(long)]
    pub event_log: Option<PathBuf>,

    /// Load into an in-memory store instead of the database.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not try to create the target database.
    #[arg(long)]
    pub skip_create_database: bool,

    #[command(flatten)]
    pub database: DatabaseConfig,
}

/// Connection settings of the target database.
#[derive(Args, Clone)]
pub struct DatabaseConfig {
    #[arg(long = "db-host", env = "DNE_DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(long = "db-port", env = "DNE_DB_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "db-user", env = "DNE_DB_USER", default_value = "postgres")]
    pub user: String,

    #[arg(long = "db-password", env = "DNE_DB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    #[arg(long = "db-name", env = "DNE_DB_NAME", default_value = "dne")]
    pub name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password_set", &self.password.is_some())
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(feature = "postgres")]
impl DatabaseConfig {
    /// Connection options for the target database.
    pub fn connect_options(&self) -> sqlx::postgres::PgConnectOptions {
        let options = sqlx::postgres::PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.name);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

impl LoaderConfig {
    /// Built-in DNE layouts, merged with `--layouts` when given.
    pub fn load_registry(&self) -> IngestionResult<LayoutRegistry> {
        let registry = LayoutRegistry::dne();
        match &self.layouts {
            Some(path) => {
                let custom = LayoutRegistry::from_path(path)?;
                log::info!("loaded {} layout(s) from {}", custom.len(), path.display());
                Ok(registry.merge(custom))
            }
            None => Ok(registry),
        }
    }

    /// Library options for this configuration. Events always go to the log; `--event-log`
    /// adds a file sink.
    pub fn ingestion_options(&self) -> IngestionOptions {
        let mut observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(LogObserver)];
        if let Some(path) = &self.event_log {
            observers.push(Arc::new(FileObserver::new(path)));
        }

        IngestionOptions {
            extension: self.extension.clone(),
            sniffer: SnifferConfig {
                default: self.default_delimiter,
                ..SnifferConfig::default()
            },
            encoding: self.encoding,
            line_terminator: self.line_terminator,
            batch_size: self.batch_size,
            observer: Some(Arc::new(CompositeObserver::new(observers))),
            ..IngestionOptions::default()
        }
    }
}

fn parse_encoding(s: &str) -> Result<SourceEncoding, String> {
    SourceEncoding::for_label(s).ok_or_else(|| format!("unknown encoding '{s}'"))
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.trim().parse::<usize>() {
        Ok(0) => Err("batch size must be at least 1".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("invalid batch size '{s}': {e}")),
    }
}

fn parse_delimiter(s: &str) -> Result<Delimiter, String> {
    Delimiter::parse(s).ok_or_else(|| format!("'{s}' is not a single-byte ASCII delimiter"))
}

fn parse_line_terminator(s: &str) -> Result<LineTerminator, String> {
    match s.to_ascii_lowercase().as_str() {
        "lf" | "\\n" => Ok(LineTerminator::Lf),
        "crlf" | "\\r\\n" => Ok(LineTerminator::CrLf),
        other => Err(format!("unknown line terminator '{other}', use 'lf' or 'crlf'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_onto_ingestion_options() {
        let config = LoaderConfig::try_parse_from([
            "dne-loader",
            "--input-dir",
            "/data/dne",
            "--encoding",
            "utf-8",
            "--batch-size",
            "250",
            "--default-delimiter",
            "tab",
            "--line-terminator",
            "crlf",
        ])
        .unwrap();

        let options = config.ingestion_options();
        assert_eq!(options.batch_size, 250);
        assert_eq!(options.encoding, SourceEncoding::UTF8);
        assert_eq!(options.sniffer.default, Delimiter::TAB);
        assert_eq!(options.line_terminator, LineTerminator::CrLf);
        assert!(options.observer.is_some());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let result =
            LoaderConfig::try_parse_from(["dne-loader", "--input-dir", "x", "--batch-size", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn password_is_not_printed() {
        let config = LoaderConfig::try_parse_from([
            "dne-loader",
            "--input-dir",
            "x",
            "--db-password",
            "hunter2",
        ])
        .unwrap();
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}

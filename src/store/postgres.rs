//! Postgres backend.
//!
//! Bulk loads stream the file through `COPY ... FROM STDIN`; batched inserts use `UNNEST` over
//! one array per column. Every write runs in its own transaction.

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::error::{StoreError, StoreResult};
use crate::layout::TableDef;
use crate::types::{ColumnType, DecodedRow};

use super::{BulkLoadRequest, InsertTemplate, Store};

const COPY_CHUNK_SIZE: usize = 64 * 1024;
const STAGING_TABLE: &str = "dne_loader_staging";

/// Postgres-backed [`Store`] holding a single connection.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the target database. The pool is capped at one connection: the loader
    /// issues one statement at a time.
    pub async fn connect(options: PgConnectOptions) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create database `name` if it does not exist yet, connecting through the `postgres`
    /// maintenance database. Returns `true` when the database was created.
    pub async fn ensure_database(options: PgConnectOptions, name: &str) -> StoreResult<bool> {
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(options.database("postgres"))
            .await?;

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(name)
                .fetch_one(&admin)
                .await?;

        if !exists {
            let create_sql = format!("CREATE DATABASE {}", quote_ident(name));
            sqlx::query(&create_sql).execute(&admin).await?;
            log::info!("created database {name}");
        }

        admin.close().await;
        Ok(!exists)
    }

    /// Close the connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Quote an identifier, preserving case.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_list(columns: &[&str]) -> String {
    if columns.is_empty() {
        String::new()
    } else {
        let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
        format!("({})", quoted.join(", "))
    }
}

/// `UPDATE` of one staging column to a bound literal, cast to the column's type when known.
fn override_update(column: &str, column_type: Option<&ColumnType>) -> String {
    let target = quote_ident(column);
    match column_type {
        Some(column_type) => format!(
            "UPDATE {STAGING_TABLE} SET {target} = $1::{}",
            column_type.sql_type()
        ),
        None => format!("UPDATE {STAGING_TABLE} SET {target} = $1"),
    }
}

fn copy_options(request: &BulkLoadRequest<'_>) -> String {
    format!(
        "FORMAT text, DELIMITER E'\\x{:02x}', ENCODING '{}'",
        request.delimiter.as_byte(),
        request.encoding.postgres_name().replace('\'', "''")
    )
}

/// Stream `request.path` into an open `COPY ... FROM STDIN`, skipping the header lines
/// client-side.
async fn copy_file(
    tx: &mut Transaction<'_, Postgres>,
    statement: &str,
    request: &BulkLoadRequest<'_>,
) -> StoreResult<u64> {
    let file = tokio::fs::File::open(request.path).await?;
    let mut reader = BufReader::new(file);

    let mut skipped = Vec::new();
    for _ in 0..request.header_lines {
        skipped.clear();
        if reader.read_until(b'\n', &mut skipped).await? == 0 {
            break;
        }
    }

    let mut copy = tx.copy_in_raw(statement).await?;
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(n) => n,
            Err(err) => {
                let _ = copy.abort(err.to_string()).await;
                return Err(err.into());
            }
        };
        if n == 0 {
            break;
        }
        copy.send(&buf[..n]).await?;
    }

    Ok(copy.finish().await?)
}

impl Store for PgStore {
    async fn ensure_table(&mut self, table: &TableDef) -> StoreResult<()> {
        let columns: Vec<String> = table
            .layout()
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.column_type.sql_type()))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&table.name),
            columns.join(", ")
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        log::debug!("table {} ready", table.name);
        Ok(())
    }

    async fn bulk_load(&mut self, request: &BulkLoadRequest<'_>) -> StoreResult<u64> {
        if !request.overrides.is_empty() && request.columns.is_empty() {
            let column = request.overrides.keys().next().cloned().unwrap_or_default();
            return Err(StoreError::InvalidOverride {
                column,
                message: "overrides need an explicit source column list".to_string(),
            });
        }

        let target = quote_ident(request.table);
        let columns = column_list(&request.columns);
        let options = copy_options(request);

        let mut tx = self.pool.begin().await?;

        let rows = if request.overrides.is_empty() {
            let statement = format!("COPY {target} {columns} FROM STDIN WITH ({options})");
            copy_file(&mut tx, &statement, request).await?
        } else {
            // COPY cannot set constants, so the file lands in a staging copy of the table first.
            let create = format!(
                "CREATE TEMP TABLE {STAGING_TABLE} (LIKE {target} INCLUDING DEFAULTS) ON COMMIT DROP"
            );
            sqlx::query(&create).execute(&mut *tx).await?;

            let statement = format!("COPY {STAGING_TABLE} {columns} FROM STDIN WITH ({options})");
            copy_file(&mut tx, &statement, request).await?;

            for (column, literal) in request.overrides {
                let column_type = request
                    .layout
                    .and_then(|layout| layout.columns.iter().find(|c| c.name == *column))
                    .map(|c| &c.column_type);
                let update = override_update(column, column_type);
                sqlx::query(&update).bind(literal).execute(&mut *tx).await?;
            }

            let insert = format!("INSERT INTO {target} SELECT * FROM {STAGING_TABLE}");
            sqlx::query(&insert).execute(&mut *tx).await?.rows_affected()
        };

        tx.commit().await?;
        Ok(rows)
    }

    async fn insert_batch(
        &mut self,
        template: &InsertTemplate<'_>,
        rows: &[DecodedRow],
    ) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let layout = template.layout;
        let mut targets = Vec::with_capacity(layout.len());
        let mut arrays = Vec::with_capacity(layout.len());
        for (idx, column) in layout.columns.iter().enumerate() {
            targets.push(quote_ident(&column.name));
            let array_type = match column.column_type {
                ColumnType::Integer => "bigint[]",
                ColumnType::Text | ColumnType::Code { .. } => "text[]",
            };
            arrays.push(format!("${}::{array_type}", idx + 1));
        }

        let sql = format!(
            "INSERT INTO {} ({}) SELECT * FROM UNNEST({})",
            quote_ident(template.table),
            targets.join(", "),
            arrays.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for (idx, column) in layout.columns.iter().enumerate() {
            query = match column.column_type {
                ColumnType::Integer => {
                    let values: Vec<Option<i64>> =
                        rows.iter().map(|r| r.values[idx].as_int()).collect();
                    query.bind(values)
                }
                ColumnType::Text | ColumnType::Code { .. } => {
                    let values: Vec<Option<String>> = rows
                        .iter()
                        .map(|r| r.values[idx].as_text().map(str::to_owned))
                        .collect();
                    query.bind(values)
                }
            };
        }

        let mut tx = self.pool.begin().await?;
        let inserted = query.execute(&mut *tx).await?.rows_affected();
        tx.commit().await?;

        log::trace!("inserted batch of {inserted} rows into {}", template.table);
        Ok(inserted)
    }
}

// ABOUTME: Destination store creation, DDL replay and Parquet table loading
// ABOUTME: Bulk-load pragmas during the load, WAL checkpoint and rollback journal afterwards

use crate::error::DistError;
use crate::migration::schema::strip_pragmas;
use crate::sqlite::converter::array_to_values;
use crate::sqlite::open_fresh_sqlite;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatchReader;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::fs::{self, File};
use std::path::Path;

/// Pragmas applied to a freshly created store before schema replay
pub const BULK_LOAD_PRAGMAS: &[(&str, &str)] = &[
    ("journal_mode", "WAL"),
    ("synchronous", "NORMAL"),
    ("cache_size", "-131072"),
    ("temp_store", "MEMORY"),
    ("mmap_size", "536870912"),
    ("foreign_keys", "OFF"),
];

/// Run `PRAGMA name = value`, draining any result row it returns
pub fn set_pragma(conn: &Connection, name: &str, value: &str) -> Result<()> {
    let sql = format!("PRAGMA {} = {}", name, value);
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to prepare {}", sql))?;
    let mut rows = stmt
        .query([])
        .with_context(|| format!("Failed to apply {}", sql))?;
    while rows.next()?.is_some() {}
    Ok(())
}

/// Creates the destination store and replays the DDL script into it
pub struct SchemaApplier;

impl SchemaApplier {
    /// Create an empty store at `path`, replacing any existing file
    pub fn create_store(path: &Path) -> Result<Connection> {
        let conn = open_fresh_sqlite(path)?;
        for (name, value) in BULK_LOAD_PRAGMAS {
            set_pragma(&conn, name, value)?;
        }
        tracing::debug!("Bulk-load pragmas applied to {}", path.display());
        Ok(conn)
    }

    /// Read the schema script at `schema_path`
    ///
    /// Called before [`SchemaApplier::create_store`], so a missing script
    /// aborts the run while any existing output is still intact.
    ///
    /// # Errors
    ///
    /// [`DistError::MissingInput`] when the script does not exist.
    pub fn read_schema(schema_path: &Path) -> Result<String> {
        if !schema_path.exists() {
            return Err(DistError::missing("schema script", schema_path).into());
        }
        fs::read_to_string(schema_path)
            .with_context(|| format!("Failed to read schema script {}", schema_path.display()))
    }

    /// Replay a schema script without its configuration pragmas
    pub fn apply_schema(conn: &Connection, ddl: &str) -> Result<()> {
        conn.execute_batch(&strip_pragmas(ddl))
            .context("Failed to replay schema script")?;
        tracing::info!("  Schema applied");
        Ok(())
    }

    /// Flush the WAL into the main file and leave the store in rollback-journal mode
    ///
    /// After this the database is a single self-contained file that opens
    /// read-only without a `-wal` companion.
    pub fn finalize_store(conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare("PRAGMA wal_checkpoint(FULL)")?;
        let mut rows = stmt.query([]).context("WAL checkpoint failed")?;
        while rows.next()?.is_some() {}
        drop(rows);
        drop(stmt);
        set_pragma(conn, "journal_mode", "DELETE")
    }
}

/// Loads Parquet files into the tables of a store created by [`SchemaApplier`]
pub struct TableLoader<'a> {
    conn: &'a mut Connection,
    batch_rows: usize,
    warnings: Vec<String>,
}

impl<'a> TableLoader<'a> {
    pub fn new(conn: &'a mut Connection, batch_rows: usize) -> Self {
        Self {
            conn,
            batch_rows: batch_rows.max(1),
            warnings: Vec::new(),
        }
    }

    /// Load one Parquet file into `table`
    ///
    /// Rows are inserted with `INSERT OR IGNORE`, so a row whose primary key
    /// already exists is skipped. The whole table commits in one transaction.
    ///
    /// # Returns
    ///
    /// `Some(inserted)` with the number of rows actually inserted, or `None`
    /// when the file is missing (a warning is recorded and the table skipped).
    pub fn load_table(&mut self, table: &str, path: &Path) -> Result<Option<u64>> {
        if !path.exists() {
            let warning = format!("file missing: {} (skipping {})", path.display(), table);
            tracing::warn!("  WARN: {}", warning);
            self.warnings.push(warning);
            return Ok(None);
        }

        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("Failed to read Parquet metadata of {}", path.display()))?
            .with_batch_size(self.batch_rows)
            .build()
            .with_context(|| format!("Failed to build Parquet reader for {}", path.display()))?;

        let columns: Vec<String> = reader
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let sql = insert_sql(table, &columns);

        let tx = self
            .conn
            .transaction()
            .with_context(|| format!("Failed to begin transaction for '{}'", table))?;
        let mut inserted: u64 = 0;
        {
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("Failed to prepare insert for '{}'", table))?;

            for batch in reader {
                let batch = batch
                    .with_context(|| format!("Failed to decode batch of {}", path.display()))?;
                let column_values: Vec<Vec<Value>> = batch
                    .columns()
                    .iter()
                    .map(array_to_values)
                    .collect::<Result<_>>()
                    .with_context(|| format!("Unsupported column in {}", path.display()))?;

                for row in 0..batch.num_rows() {
                    let params = column_values.iter().map(|col| &col[row]);
                    inserted += stmt
                        .execute(params_from_iter(params))
                        .with_context(|| format!("Failed to insert row into '{}'", table))?
                        as u64;
                }
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit load of '{}'", table))?;

        Ok(Some(inserted))
    }

    /// Soft conditions recorded while loading
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list,
        placeholders
    )
}

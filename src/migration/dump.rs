// ABOUTME: Table export from SQLite into ZSTD-compressed Parquet files
// ABOUTME: Streams rows in bounded batches against a schema fixed from declared column types

use crate::config::DistConfig;
use crate::migration::filtered::build_select_sql;
use crate::sqlite::converter::build_column;
use crate::sqlite::reader::{table_columns, ColumnInfo};
use crate::sqlite::type_map::ColumnKind;
use crate::table_rules::FilterOverride;
use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use rusqlite::types::Value;
use rusqlite::Connection;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

/// Provenance keys embedded in every exported Parquet file
pub mod meta_keys {
    pub const SOURCE_TABLE: &str = "source_table";
    pub const SOURCE_DB: &str = "source_db";
    pub const EXPORT_TIME: &str = "export_time";
}

/// Writes one table (or a bounded prefix of it) to a Parquet file
pub struct TableExporter<'a> {
    conn: &'a Connection,
    config: &'a DistConfig,
}

impl<'a> TableExporter<'a> {
    pub fn new(conn: &'a Connection, config: &'a DistConfig) -> Self {
        Self { conn, config }
    }

    /// Export `table` to `out_path`
    ///
    /// Rows come from the filter override's join query when one is given, and
    /// are capped at `limit` when set. The Parquet schema is built from the
    /// declared column types before any row is read, so all-null and empty
    /// tables still carry their real column types.
    ///
    /// If the string fallback would turn a stored value into null in a
    /// `NOT NULL` column (text such as `'n/a'` in an `INTEGER NOT NULL`
    /// column), that column is exported as string instead and the file is
    /// written again, so every exported row can be loaded back.
    ///
    /// # Returns
    ///
    /// Number of rows written to the file
    ///
    /// # Errors
    ///
    /// Any SQLite, Arrow, Parquet or filesystem error aborts the export. Values
    /// that do not fit their column kind never cause an error; the affected
    /// batch column is rebuilt through the string fallback instead.
    pub fn export_table(
        &self,
        table: &str,
        out_path: &Path,
        filter: Option<&FilterOverride>,
        limit: Option<usize>,
    ) -> Result<u64> {
        let mut columns = table_columns(self.conn, table)?;
        if columns.is_empty() {
            bail!("Table '{}' has no columns or does not exist", table);
        }

        loop {
            match self.write_file(table, out_path, filter, limit, &columns)? {
                Flush::Written(rows) => return Ok(rows),
                Flush::NullInNotNull(idx) => {
                    let column = &mut columns[idx];
                    tracing::warn!(
                        "  {}.{} holds values that are not {} in a NOT NULL column; exporting it as string",
                        table,
                        column.name,
                        column.kind
                    );
                    column.kind = ColumnKind::String;
                }
            }
        }
    }

    fn write_file(
        &self,
        table: &str,
        out_path: &Path,
        filter: Option<&FilterOverride>,
        limit: Option<usize>,
        columns: &[ColumnInfo],
    ) -> Result<Flush> {
        let schema = self.arrow_schema(table, columns);

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let file = File::create(out_path)
            .with_context(|| format!("Failed to create {}", out_path.display()))?;
        let props = self.writer_properties(table)?;
        let mut writer = ArrowWriter::try_new(file, schema.clone(), Some(props))
            .with_context(|| format!("Failed to open Parquet writer for {}", out_path.display()))?;

        let select_sql = build_select_sql(table, filter, limit);
        tracing::debug!("Exporting '{}' with: {}", table, select_sql);

        let mut stmt = self
            .conn
            .prepare(&select_sql)
            .with_context(|| format!("Failed to prepare export query for '{}'", table))?;
        let mut rows = stmt
            .query([])
            .with_context(|| format!("Failed to query rows of '{}'", table))?;

        let batch_rows = self.config.export_batch_rows.max(1);
        let mut buffers: Vec<Vec<Value>> = columns
            .iter()
            .map(|_| Vec::with_capacity(batch_rows))
            .collect();
        let mut written: u64 = 0;
        let mut batch_index: usize = 0;

        while let Some(row) = rows
            .next()
            .with_context(|| format!("Failed to read row from '{}'", table))?
        {
            for (idx, buffer) in buffers.iter_mut().enumerate() {
                buffer.push(row.get::<_, Value>(idx)?);
            }

            if buffers[0].len() >= batch_rows {
                match self.flush_batch(
                    table,
                    &schema,
                    columns,
                    &mut buffers,
                    batch_index,
                    &mut writer,
                )? {
                    Flush::Written(n) => written += n,
                    lost => return Ok(lost),
                }
                batch_index += 1;
            }
        }

        if !buffers[0].is_empty() {
            match self.flush_batch(
                table,
                &schema,
                columns,
                &mut buffers,
                batch_index,
                &mut writer,
            )? {
                Flush::Written(n) => written += n,
                lost => return Ok(lost),
            }
        }

        writer
            .close()
            .with_context(|| format!("Failed to finalize Parquet file {}", out_path.display()))?;

        Ok(Flush::Written(written))
    }

    fn arrow_schema(&self, table: &str, columns: &[ColumnInfo]) -> SchemaRef {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.name.as_str(), c.kind.arrow_type(), true))
            .collect();

        let metadata: HashMap<String, String> = self
            .provenance(table)
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Arc::new(Schema::new(fields).with_metadata(metadata))
    }

    fn provenance(&self, table: &str) -> Vec<(&'static str, String)> {
        vec![
            (meta_keys::SOURCE_TABLE, table.to_string()),
            (meta_keys::SOURCE_DB, self.config.source_id.clone()),
            (meta_keys::EXPORT_TIME, self.config.export_time.to_string()),
        ]
    }

    fn writer_properties(&self, table: &str) -> Result<WriterProperties> {
        let level = ZstdLevel::try_new(self.config.zstd_level)
            .with_context(|| format!("Invalid ZSTD level {}", self.config.zstd_level))?;

        let key_values = self
            .provenance(table)
            .into_iter()
            .map(|(k, v)| KeyValue::new(k.to_string(), v))
            .collect();

        Ok(WriterProperties::builder()
            .set_compression(Compression::ZSTD(level))
            .set_max_row_group_size(self.config.row_group_size.max(1))
            .set_key_value_metadata(Some(key_values))
            .build())
    }

    fn flush_batch(
        &self,
        table: &str,
        schema: &SchemaRef,
        columns: &[ColumnInfo],
        buffers: &mut [Vec<Value>],
        batch_index: usize,
        writer: &mut ArrowWriter<File>,
    ) -> Result<Flush> {
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());
        for (idx, (column, buffer)) in columns.iter().zip(buffers.iter_mut()).enumerate() {
            let (array, fell_back) = build_column(column.kind, buffer).with_context(|| {
                format!("Failed to build column '{}' of '{}'", column.name, table)
            })?;
            if fell_back && column.notnull {
                let stored_nulls = buffer.iter().filter(|v| matches!(v, Value::Null)).count();
                if array.null_count() > stored_nulls {
                    return Ok(Flush::NullInNotNull(idx));
                }
            }
            if fell_back {
                tracing::debug!(
                    "Cast fallback: {}.{} batch {} rebuilt from text as {}",
                    table,
                    column.name,
                    batch_index,
                    column.kind
                );
            }
            arrays.push(array);
            buffer.clear();
        }

        let batch = RecordBatch::try_new(schema.clone(), arrays)
            .with_context(|| format!("Failed to assemble record batch for '{}'", table))?;
        let rows = batch.num_rows() as u64;
        writer
            .write(&batch)
            .with_context(|| format!("Failed to write record batch for '{}'", table))?;

        Ok(Flush::Written(rows))
    }
}

/// Result of writing a batch or a whole file
enum Flush {
    Written(u64),
    /// The fallback nulled a stored value of this NOT NULL column
    NullInNotNull(usize),
}

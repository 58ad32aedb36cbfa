// ABOUTME: SQLite database introspection: tables, columns, row counts and schema objects
// ABOUTME: Everything export and validation need to know about a store before touching rows

use crate::sqlite::type_map::ColumnKind;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use rusqlite::Connection;

/// A column as declared in the table definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type text exactly as written in the DDL (may be empty)
    pub declared_type: String,
    /// Semantic kind derived once from `declared_type`
    pub kind: ColumnKind,
    /// Declared `NOT NULL`
    pub notnull: bool,
}

/// A user-defined schema object from `sqlite_master`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    pub object_type: String,
    pub name: String,
    pub sql: String,
}

/// List the user tables of a store, sorted by name
///
/// `sqlite_*` internals (sqlite_sequence, sqlite_stat1, ...) are never
/// exported, so they are excluded here rather than by the table rules.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master \
             WHERE type='table' \
             AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .context("Failed to prepare table listing")?;

    let tables = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("Failed to query table list")?
        .collect::<Result<Vec<String>, _>>()
        .context("Failed to collect table names")?;

    tracing::debug!("Found {} user tables", tables.len());

    Ok(tables)
}

/// Get the raw row count of a table
pub fn get_table_row_count(conn: &Connection, table: &str) -> Result<u64> {
    tracing::debug!("Getting row count for table '{}'", table);

    let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows in table '{}'", table))?;

    Ok(count as u64)
}

/// Count the rows a SELECT statement would return
///
/// Used to size filtered exports before writing them; the statement is wrapped
/// as a subquery so join-based filters keep their index plans.
pub fn count_select_rows(conn: &Connection, select_sql: &str) -> Result<u64> {
    let query = format!("SELECT COUNT(*) FROM ({})", select_sql);

    let count: i64 = conn
        .query_row(&query, [], |row| row.get(0))
        .with_context(|| format!("Failed to count rows for query: {}", select_sql))?;

    Ok(count as u64)
}

/// Read the declared columns of a table, in definition order
///
/// The column kind is derived here, once, from the declared type so that every
/// batch of the export uses the same schema regardless of the values it holds.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnInfo>> {
    let query = format!("PRAGMA table_info({})", quote_ident(table));
    let mut stmt = conn
        .prepare(&query)
        .with_context(|| format!("Failed to get table info for '{}'", table))?;

    // table_info rows: (cid, name, type, notnull, dflt_value, pk)
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared_type: Option<String> = row.get(2)?;
            let notnull: i64 = row.get(3)?;
            Ok((name, declared_type.unwrap_or_default(), notnull != 0))
        })
        .context("Failed to query table columns")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect column names")?
        .into_iter()
        .map(|(name, declared_type, notnull)| ColumnInfo {
            kind: ColumnKind::from_declared_type(&declared_type),
            name,
            declared_type,
            notnull,
        })
        .collect::<Vec<_>>();

    tracing::debug!("Table '{}' has {} columns", table, columns.len());

    Ok(columns)
}

/// List user tables, indexes, triggers and views in dependency-safe replay order
///
/// Objects without SQL text (auto-indexes) and `sqlite_*` internals are
/// excluded. Order is tables, indexes, triggers, views; by name within a kind.
pub fn list_schema_objects(conn: &Connection) -> Result<Vec<SchemaObject>> {
    let mut stmt = conn
        .prepare(
            "SELECT type, name, sql
             FROM sqlite_master
             WHERE sql IS NOT NULL
               AND name NOT LIKE 'sqlite_%'
             ORDER BY
               CASE type
                 WHEN 'table'   THEN 1
                 WHEN 'index'   THEN 2
                 WHEN 'trigger' THEN 3
                 WHEN 'view'    THEN 4
                 ELSE 5
               END,
               name",
        )
        .context("Failed to prepare schema object query")?;

    let objects = stmt
        .query_map([], |row| {
            Ok(SchemaObject {
                object_type: row.get(0)?,
                name: row.get(1)?,
                sql: row.get(2)?,
            })
        })
        .context("Failed to query schema objects")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect schema objects")?;

    Ok(objects)
}

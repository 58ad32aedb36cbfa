// ABOUTME: Export command: source SQLite store to schema script, Parquet files and manifest
// ABOUTME: Tables are categorized by exported row count into lookups and release assets

use crate::config::{DistConfig, Layout};
use crate::error::DistError;
use crate::manifest::{Category, Manifest, ManifestBuilder};
use crate::migration::dump::TableExporter;
use crate::migration::estimation::format_bytes;
use crate::migration::filtered::build_select_sql;
use crate::migration::schema::extract_schema;
use crate::sqlite::open_sqlite;
use crate::sqlite::reader::{count_select_rows, list_tables};
use crate::table_rules::TableRules;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Source database
    pub db: PathBuf,
    /// Distribution root receiving `schema/` and `data/`
    pub out: PathBuf,
    /// Leave out tables above the category threshold
    pub skip_large: bool,
}

/// Export every table of the source store into a distribution tree
///
/// Steps:
/// 1. Write the DDL script for every schema object (skipped tables included)
/// 2. Export each exportable table, applying its filter override, into
///    `data/lookups/` or `data/release/` according to its exported row count,
///    plus a bounded sample into `data/samples/`
/// 3. Write the manifest and log a size summary
///
/// # Errors
///
/// [`DistError::MissingInput`] when the source database does not exist; any
/// SQLite, Parquet or filesystem error aborts the run.
pub fn export(
    options: &ExportOptions,
    config: &DistConfig,
    rules: &TableRules,
) -> Result<Manifest> {
    if !options.db.exists() {
        return Err(DistError::missing("database", &options.db).into());
    }
    let conn = open_sqlite(&options.db)?;
    let layout = &config.layout;
    let root = options.out.as_path();

    let tables: Vec<String> = list_tables(&conn)?
        .into_iter()
        .filter(|t| rules.should_export(t))
        .collect();
    tracing::info!(
        "Found {} tables to export ({} skipped by rule)",
        tables.len(),
        rules.skip_tables().count()
    );

    tracing::info!("[1/3] Extracting schema...");
    extract_schema(&conn, &root.join(&layout.schema_sql), &config.source_id)?;

    tracing::info!("[2/3] Exporting tables...");
    let exporter = TableExporter::new(&conn, config);
    let mut builder = ManifestBuilder::new(root, config, rules.fingerprint());

    for table in &tables {
        let filter = rules.filter_override(table);
        let expected = count_select_rows(&conn, &build_select_sql(table, filter, None))?;
        let planned = Category::for_rows(expected, config.category_threshold);

        if options.skip_large && planned == Category::Large {
            tracing::info!("  SKIP  {:40} ({:>10} rows) --skip-large", table, expected);
            continue;
        }

        let started = Instant::now();
        let mut dest = category_path(root, layout, planned, table);
        let rows = exporter
            .export_table(table, &dest, filter, None)
            .with_context(|| format!("Failed to export table '{}'", table))?;

        // Category follows the rows actually written, which can differ from the pre-count
        let category = Category::for_rows(rows, config.category_threshold);
        if category != planned {
            let moved = category_path(root, layout, category, table);
            if let Some(parent) = moved.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::rename(&dest, &moved).with_context(|| {
                format!("Failed to move {} to {}", dest.display(), moved.display())
            })?;
            dest = moved;
        }
        if options.skip_large && category == Category::Large {
            fs::remove_file(&dest)
                .with_context(|| format!("Failed to remove {}", dest.display()))?;
            tracing::info!("  SKIP  {:40} ({:>10} rows) --skip-large", table, rows);
            continue;
        }

        let sample = root
            .join(&layout.samples_dir)
            .join(Layout::sample_file_name(table));
        let sample_limit = config.sample_size.min(rows as usize);
        exporter
            .export_table(table, &sample, filter, Some(sample_limit))
            .with_context(|| format!("Failed to export sample of '{}'", table))?;

        let entry = builder.record(table, rows, &dest, &sample, filter.map(|f| f.id()))?;
        let tag = match entry.category {
            Category::Lookup => "LOOKUP",
            Category::Large => "LARGE ",
        };
        tracing::info!(
            "  [{}] {:40} {:>10} rows -> {:>8}  ({:.1}s)",
            tag,
            table,
            rows,
            format_bytes(entry.size_bytes),
            started.elapsed().as_secs_f64()
        );
        if rows < expected {
            tracing::debug!("{}: {} rows filtered on export", table, expected - rows);
        }
    }

    tracing::info!("[3/3] Writing manifest...");
    let source_bytes = fs::metadata(&options.db)
        .with_context(|| format!("Failed to stat {}", options.db.display()))?
        .len();
    let summary = builder.size_summary(source_bytes);
    let manifest = builder.finish();
    let manifest_path = root.join(&layout.manifest);
    manifest.save(&manifest_path)?;
    tracing::info!("  Manifest -> {}", manifest_path.display());

    summary.log();
    Ok(manifest)
}

fn category_path(root: &Path, layout: &Layout, category: Category, table: &str) -> PathBuf {
    let dir = match category {
        Category::Lookup => &layout.lookups_dir,
        Category::Large => &layout.release_dir,
    };
    root.join(dir).join(Layout::table_file_name(table))
}

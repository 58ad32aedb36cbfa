// ABOUTME: Run configuration for export and reconstruction (thresholds, layout, release source)
// ABOUTME: Parses optional TOML overrides into DistConfig, ReleaseSource and TableRules

use crate::table_rules::TableRules;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const DEFAULT_CATEGORY_THRESHOLD: u64 = 5_000;
pub const DEFAULT_ZSTD_LEVEL: i32 = 9;
pub const DEFAULT_SAMPLE_SIZE: usize = 1_000;
pub const DEFAULT_REPO: &str = "Aknowmadic/pronunciation_db_dist";
pub const LATEST_TAG: &str = "latest";

/// Relative layout of a distribution root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub schema_sql: PathBuf,
    pub manifest: PathBuf,
    pub lookups_dir: PathBuf,
    pub samples_dir: PathBuf,
    pub release_dir: PathBuf,
    pub download_dir: PathBuf,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            schema_sql: PathBuf::from("schema/schema.sql"),
            manifest: PathBuf::from("schema/table_manifest.json"),
            lookups_dir: PathBuf::from("data/lookups"),
            samples_dir: PathBuf::from("data/samples"),
            release_dir: PathBuf::from("data/release"),
            download_dir: PathBuf::from("data/_tmp_downloaded"),
        }
    }
}

impl Layout {
    pub fn table_file_name(table: &str) -> String {
        format!("{}.parquet", table)
    }

    pub fn sample_file_name(table: &str) -> String {
        format!("{}_sample.parquet", table)
    }
}

/// Settings shared by every stage of a run
///
/// Every former process-wide constant lives here so a test can inject a small
/// threshold or a fixed export time without touching global state.
#[derive(Debug, Clone)]
pub struct DistConfig {
    /// Tables with at most this many exported rows are "lookup" tables
    pub category_threshold: u64,
    /// ZSTD level (1-22) for every Parquet file
    pub zstd_level: i32,
    /// Rows fetched from SQLite per Arrow batch during export
    pub export_batch_rows: usize,
    /// Maximum rows per Parquet row group
    pub row_group_size: usize,
    /// Rows per INSERT batch during reconstruction
    pub load_batch_rows: usize,
    /// Row limit for the per-table sample files
    pub sample_size: usize,
    /// Identifier of the source database recorded as provenance
    pub source_id: String,
    /// Unix seconds embedded in every Parquet file of the run
    pub export_time: u64,
    pub layout: Layout,
}

impl Default for DistConfig {
    fn default() -> Self {
        Self {
            category_threshold: DEFAULT_CATEGORY_THRESHOLD,
            zstd_level: DEFAULT_ZSTD_LEVEL,
            export_batch_rows: 100_000,
            row_group_size: 50_000,
            load_batch_rows: 10_000,
            sample_size: DEFAULT_SAMPLE_SIZE,
            source_id: String::from("source.db"),
            export_time: default_export_time(),
            layout: Layout::default(),
        }
    }
}

/// Where large-table assets are published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSource {
    /// `owner/name` repository identifier
    pub repo: String,
    /// Release tag; [`LATEST_TAG`] resolves to the most recent release
    pub tag: String,
    pub base_url: String,
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self {
            repo: DEFAULT_REPO.to_string(),
            tag: LATEST_TAG.to_string(),
            base_url: "https://github.com".to_string(),
        }
    }
}

/// Export time honouring `SOURCE_DATE_EPOCH` so repeated exports are byte-identical
pub fn default_export_time() -> u64 {
    if let Some(epoch) = std::env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
    {
        return epoch;
    }
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    category_threshold: Option<u64>,
    zstd_level: Option<i32>,
    export_batch_rows: Option<usize>,
    row_group_size: Option<usize>,
    load_batch_rows: Option<usize>,
    sample_size: Option<usize>,
    source_id: Option<String>,
    #[serde(default)]
    skip_tables: Vec<String>,
    #[serde(default)]
    filter_overrides: Vec<FilterOverrideConfig>,
    release: Option<ReleaseConfig>,
}

#[derive(Debug, Deserialize)]
struct FilterOverrideConfig {
    table: String,
    joins: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseConfig {
    repo: Option<String>,
    tag: Option<String>,
    base_url: Option<String>,
}

/// Apply a TOML config file on top of existing settings
///
/// Unset keys leave the current value alone. Skip tables and filter overrides
/// are added to `rules`.
pub fn apply_config_file(
    path: &Path,
    config: &mut DistConfig,
    release: &mut ReleaseSource,
    rules: &mut TableRules,
) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let parsed: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse TOML config at {}", path.display()))?;

    if let Some(threshold) = parsed.category_threshold {
        config.category_threshold = threshold;
    }
    if let Some(level) = parsed.zstd_level {
        if !(1..=22).contains(&level) {
            bail!("zstd_level must be between 1 and 22, got {}", level);
        }
        config.zstd_level = level;
    }
    if let Some(rows) = parsed.export_batch_rows {
        config.export_batch_rows = non_zero(rows, "export_batch_rows")?;
    }
    if let Some(rows) = parsed.row_group_size {
        config.row_group_size = non_zero(rows, "row_group_size")?;
    }
    if let Some(rows) = parsed.load_batch_rows {
        config.load_batch_rows = non_zero(rows, "load_batch_rows")?;
    }
    if let Some(size) = parsed.sample_size {
        config.sample_size = size;
    }
    if let Some(source_id) = parsed.source_id {
        config.source_id = source_id;
    }

    for table in parsed.skip_tables {
        rules.add_skip_table(table)?;
    }
    let specs: Vec<String> = parsed
        .filter_overrides
        .into_iter()
        .map(|o| format!("{}:{}", o.table, o.joins.join(",")))
        .collect();
    rules.apply_filter_override_cli(&specs)?;

    if let Some(rel) = parsed.release {
        if let Some(repo) = rel.repo {
            release.repo = repo;
        }
        if let Some(tag) = rel.tag {
            release.tag = tag;
        }
        if let Some(base_url) = rel.base_url {
            release.base_url = base_url;
        }
    }

    tracing::debug!("Applied config file {}", path.display());
    Ok(())
}

fn non_zero(value: usize, key: &str) -> Result<usize> {
    if value == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(value)
}

// ABOUTME: Distribution manifest: per-table row counts, categories, paths and checksums
// ABOUTME: Built during export, persisted as pretty JSON, read back by reconstruct and validate

use crate::config::DistConfig;
use crate::error::DistError;
use crate::migration::checksum::sha256_file;
use crate::migration::estimation::{format_bytes, SizeSummary};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier of the columnar backend recorded in every manifest
pub const COLUMNAR_BACKEND: &str = "arrow-rs/parquet";

/// Distribution channel of a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Small enough to ship alongside the source tree
    Lookup,
    /// Published as a separately fetched release asset
    Large,
}

impl Category {
    /// Lookup iff `rows <= threshold`
    pub fn for_rows(rows: u64, threshold: u64) -> Self {
        if rows <= threshold {
            Category::Lookup
        } else {
            Category::Large
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Lookup => f.write_str("lookup"),
            Category::Large => f.write_str("large"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    /// Rows written to the Parquet file (post-filter)
    pub rows: u64,
    pub category: Category,
    /// Path of the full file, relative to the distribution root
    pub parquet_path: String,
    /// Path of the sample file, relative to the distribution root
    pub sample_path: String,
    pub size_bytes: u64,
    pub size_human: String,
    pub sha256: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_override: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMeta {
    pub source_db: String,
    pub zstd_level: i32,
    pub in_git_threshold: u64,
    pub columnar_backend: String,
    pub exported_at: u64,
    #[serde(default)]
    pub rules_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub tables: BTreeMap<String, TableEntry>,
    pub export_meta: ExportMeta,
}

impl Manifest {
    /// Read a manifest from disk
    ///
    /// # Errors
    ///
    /// [`DistError::MissingInput`] when the file does not exist; a parse error
    /// when it is not a valid manifest.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DistError::missing("manifest", path).into());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest at {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest JSON at {}", path.display()))?;
        Ok(manifest)
    }

    /// Write the manifest atomically (temp file in the same directory, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create manifest directory {}", parent.display()))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp manifest in {}", parent.display()))?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), self)
            .with_context(|| format!("Failed to serialize manifest at {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("Failed to persist manifest at {}", path.display()))?;

        Ok(())
    }

    pub fn tables_in(&self, category: Category) -> impl Iterator<Item = (&String, &TableEntry)> {
        self.tables
            .iter()
            .filter(move |(_, entry)| entry.category == category)
    }
}

/// Accumulates table entries during one export run
pub struct ManifestBuilder {
    root: PathBuf,
    threshold: u64,
    meta: ExportMeta,
    tables: BTreeMap<String, TableEntry>,
}

impl ManifestBuilder {
    pub fn new(root: &Path, config: &DistConfig, rules_fingerprint: String) -> Self {
        Self {
            root: root.to_path_buf(),
            threshold: config.category_threshold,
            meta: ExportMeta {
                source_db: config.source_id.clone(),
                zstd_level: config.zstd_level,
                in_git_threshold: config.category_threshold,
                columnar_backend: COLUMNAR_BACKEND.to_string(),
                exported_at: config.export_time,
                rules_fingerprint,
            },
            tables: BTreeMap::new(),
        }
    }

    /// Record an exported table
    ///
    /// `rows` must be the count returned by the exporter, not the source's raw
    /// count. Size and checksum are read from the file as it is now on disk.
    pub fn record(
        &mut self,
        table: &str,
        rows: u64,
        parquet_path: &Path,
        sample_path: &Path,
        filter_override: Option<String>,
    ) -> Result<&TableEntry> {
        let size_bytes = fs::metadata(parquet_path)
            .with_context(|| format!("Failed to stat {}", parquet_path.display()))?
            .len();
        let sha256 = sha256_file(parquet_path)?;

        let entry = TableEntry {
            rows,
            category: Category::for_rows(rows, self.threshold),
            parquet_path: self.relative(parquet_path),
            sample_path: self.relative(sample_path),
            size_bytes,
            size_human: format_bytes(size_bytes),
            sha256,
            filter_override,
        };

        self.tables.insert(table.to_string(), entry);
        self.tables
            .get(table)
            .with_context(|| format!("Manifest entry for '{}' vanished", table))
    }

    pub fn size_summary(&self, source_bytes: u64) -> SizeSummary {
        let mut summary = SizeSummary {
            source_bytes,
            ..SizeSummary::default()
        };
        for entry in self.tables.values() {
            match entry.category {
                Category::Lookup => summary.lookup_bytes += entry.size_bytes,
                Category::Large => summary.large_bytes += entry.size_bytes,
            }
        }
        summary
    }

    pub fn finish(self) -> Manifest {
        Manifest {
            tables: self.tables,
            export_meta: self.meta,
        }
    }

    fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

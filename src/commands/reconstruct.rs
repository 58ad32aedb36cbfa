// ABOUTME: Reconstruct command: manifest-driven rebuild of a SQLite store from a distribution
// ABOUTME: Drives the INIT -> SCHEMA_APPLIED -> FETCHED/LOADED -> VALIDATED -> DONE pipeline

use crate::config::DistConfig;
use crate::integrity::{
    integrity_check, GroundTruth, IntegrityValidator, ValidationMode, ValidationReport,
};
use crate::manifest::Manifest;
use crate::migration::restore::{SchemaApplier, TableLoader};
use crate::remote::{AssetFetcher, FetchMode};
use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Stage of a reconstruction run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    SchemaApplied,
    Fetched(String),
    Loaded(String),
    Validated,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => write!(f, "INIT"),
            PipelineState::SchemaApplied => write!(f, "SCHEMA_APPLIED"),
            PipelineState::Fetched(table) => write!(f, "FETCHED({})", table),
            PipelineState::Loaded(table) => write!(f, "LOADED({})", table),
            PipelineState::Validated => write!(f, "VALIDATED"),
            PipelineState::Done => write!(f, "DONE"),
            PipelineState::Failed => write!(f, "FAILED"),
        }
    }
}

impl PipelineState {
    fn can_advance_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Failed, _) | (Done, _) => false,
            (_, Failed) => true,
            (Init, SchemaApplied) => true,
            (SchemaApplied | Loaded(_), Fetched(_)) => true,
            (Fetched(a), Loaded(b)) => a == b,
            (SchemaApplied | Loaded(_), Validated) => true,
            (Validated, Done) => true,
            _ => false,
        }
    }
}

/// Tracks the current stage and rejects out-of-order transitions
#[derive(Debug)]
pub struct Pipeline {
    state: PipelineState,
    history: Vec<PipelineState>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            state: PipelineState::Init,
            history: vec![PipelineState::Init],
        }
    }
}

impl Pipeline {
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_advance_to(&next) {
            bail!("Invalid pipeline transition {} -> {}", self.state, next);
        }
        tracing::debug!("Pipeline: {} -> {}", self.state, next);
        self.state = next.clone();
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self) {
        if self.state != PipelineState::Failed {
            tracing::debug!("Pipeline: {} -> {}", self.state, PipelineState::Failed);
            self.state = PipelineState::Failed;
            self.history.push(PipelineState::Failed);
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconstructOptions {
    /// Distribution root holding `schema/` and `data/`
    pub root: PathBuf,
    /// Destination database; replaced if it exists
    pub output: PathBuf,
    pub mode: FetchMode,
    pub ground_truth: GroundTruth,
}

/// Outcome of a successful reconstruction
#[derive(Debug)]
pub struct ReconstructSummary {
    pub output: PathBuf,
    pub tables_loaded: usize,
    pub rows_loaded: u64,
    /// Soft conditions from loading (missing files)
    pub warnings: Vec<String>,
    pub report: ValidationReport,
    pub history: Vec<PipelineState>,
}

/// Rebuild a store from the distribution at `options.root` and validate it
///
/// Any hard error (missing schema or manifest, checksum mismatch, transfer
/// failure, structural corruption, failed validation) moves the pipeline to
/// `FAILED` and is returned.
pub async fn reconstruct(
    options: &ReconstructOptions,
    config: &DistConfig,
) -> Result<ReconstructSummary> {
    let mut pipeline = Pipeline::default();
    match run(options, config, &mut pipeline).await {
        Ok(summary) => Ok(summary),
        Err(e) => {
            pipeline.fail();
            tracing::error!("Reconstruction failed: {:#}", e);
            Err(e)
        }
    }
}

async fn run(
    options: &ReconstructOptions,
    config: &DistConfig,
    pipeline: &mut Pipeline,
) -> Result<ReconstructSummary> {
    let started = Instant::now();
    let layout = &config.layout;

    let manifest = Manifest::load(&options.root.join(&layout.manifest))?;
    tracing::info!(
        "Manifest: {} tables, threshold {} rows",
        manifest.tables.len(),
        manifest.export_meta.in_git_threshold
    );

    let schema_path = options.root.join(&layout.schema_sql);
    let ddl = SchemaApplier::read_schema(&schema_path)?;

    tracing::info!("=== [1/4] Creating schema ===");
    let mut conn = SchemaApplier::create_store(&options.output)?;
    SchemaApplier::apply_schema(&conn, &ddl)
        .with_context(|| format!("Failed to replay {}", schema_path.display()))?;
    pipeline.advance(PipelineState::SchemaApplied)?;

    tracing::info!("=== [2/4] Loading data ===");
    let fetcher = AssetFetcher::new(&options.root, layout, options.mode.clone())?;
    let mut unloaded = Vec::new();
    let mut tables_loaded = 0usize;
    let mut rows_loaded = 0u64;
    let warnings = {
        let mut loader = TableLoader::new(&mut conn, config.load_batch_rows);
        for (table, entry) in &manifest.tables {
            let path = fetcher.resolve(table, entry).await?;
            pipeline.advance(PipelineState::Fetched(table.clone()))?;

            let table_started = Instant::now();
            match loader.load_table(table, &path)? {
                Some(inserted) => {
                    tables_loaded += 1;
                    rows_loaded += inserted;
                    tracing::info!(
                        "  ✓ {:40} {:>10} rows  ({:.1}s)",
                        table,
                        inserted,
                        table_started.elapsed().as_secs_f64()
                    );
                }
                None => unloaded.push(table.clone()),
            }
            pipeline.advance(PipelineState::Loaded(table.clone()))?;
        }
        loader.warnings().to_vec()
    };

    tracing::info!("=== [3/4] Structural integrity ===");
    let status = integrity_check(&conn)?;
    if status != "ok" {
        bail!("PRAGMA integrity_check reported: {}", status);
    }
    tracing::info!("  ✓ integrity_check: ok");

    tracing::info!("=== [4/4] Validation ===");
    let validator =
        IntegrityValidator::new(&conn, ValidationMode::Reconstructed, &options.ground_truth);
    let report = validator
        .with_unloaded_tables(unloaded)
        .run(&manifest)?
        .into_result()
        .map_err(|e| {
            if warnings.is_empty() {
                e
            } else {
                e.context(format!("Load warnings: {}", warnings.join("; ")))
            }
        })?;
    pipeline.advance(PipelineState::Validated)?;

    SchemaApplier::finalize_store(&conn)
        .with_context(|| format!("Failed to finalize {}", options.output.display()))?;
    drop(conn);
    pipeline.advance(PipelineState::Done)?;

    tracing::info!(
        "✓ Reconstructed {} ({} tables, {} rows) in {:.1}s",
        options.output.display(),
        tables_loaded,
        rows_loaded,
        started.elapsed().as_secs_f64()
    );
    if !warnings.is_empty() {
        tracing::warn!("{} warning(s) during load", warnings.len());
    }

    Ok(ReconstructSummary {
        output: options.output.clone(),
        tables_loaded,
        rows_loaded,
        warnings,
        report,
        history: pipeline.history().to_vec(),
    })
}

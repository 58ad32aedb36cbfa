// ABOUTME: Validate command: run the integrity battery against an existing store
// ABOUTME: Works on reconstructed stores (strict) or the original source (lenient)

use crate::error::DistError;
use crate::integrity::{GroundTruth, IntegrityValidator, ValidationMode, ValidationReport};
use crate::manifest::Manifest;
use crate::sqlite::open_sqlite;
use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ValidateOptions {
    pub db: PathBuf,
    pub manifest: PathBuf,
    pub skip_fk: bool,
    pub mode: ValidationMode,
    pub ground_truth: GroundTruth,
}

/// Validate the store at `options.db` against a manifest
///
/// The store is opened read-only.
///
/// # Errors
///
/// - [`DistError::MissingInput`] when the database or manifest is absent
/// - [`DistError::ValidationFailed`] when any check failed
pub fn validate(options: &ValidateOptions) -> Result<ValidationReport> {
    if !options.db.exists() {
        return Err(DistError::missing("database", &options.db).into());
    }
    let manifest = Manifest::load(&options.manifest)?;
    let conn = open_sqlite(&options.db)?;

    tracing::info!(
        "Validating {} against {} ({:?} mode)",
        options.db.display(),
        options.manifest.display(),
        options.mode
    );

    let report = IntegrityValidator::new(&conn, options.mode, &options.ground_truth)
        .skip_foreign_keys(options.skip_fk)
        .run(&manifest)?;

    tracing::info!(
        "Result: {}/{} checks passed, {} warning(s)",
        report.passed(),
        report.total(),
        report.warnings.len()
    );
    let report = report.into_result()?;
    tracing::info!("✓ All checks passed");
    Ok(report)
}

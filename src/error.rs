// ABOUTME: Typed failure taxonomy for export, reconstruction and validation runs
// ABOUTME: Carried inside anyhow::Error so callers can downcast to the specific condition

use std::path::PathBuf;
use thiserror::Error;

/// Hard failures that terminate a run with a nonzero exit status.
///
/// Soft conditions (expected orphan surplus, FK violations found while scanning
/// the raw source, per-batch cast fallback) never become a `DistError`; they are
/// logged as warnings and the run continues.
#[derive(Debug, Error)]
pub enum DistError {
    /// A required schema, manifest or database file is absent
    #[error("{what} not found at {}", path.display())]
    MissingInput { what: &'static str, path: PathBuf },

    /// A cached or freshly downloaded asset does not hash to the manifest value
    #[error("checksum mismatch for {}: expected {expected}, got {actual}", path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Network error or non-success HTTP status while fetching an asset
    #[error("failed to download {url}: {reason}")]
    TransferFailure { url: String, reason: String },

    /// Reconstructed store holds fewer rows than the manifest recorded
    #[error("table '{table}' has {actual} rows, manifest expects {expected}")]
    RowCountShortfall {
        table: String,
        expected: u64,
        actual: u64,
    },

    /// Foreign-key violations in a store that must be referentially clean
    #[error("{count} foreign key violation(s) in reconstructed database")]
    ReferentialViolation { count: usize },

    /// One or more validator checks failed
    #[error("validation failed: {failed} of {total} check(s) failed")]
    ValidationFailed { failed: usize, total: usize },
}

impl DistError {
    pub fn missing(what: &'static str, path: impl Into<PathBuf>) -> Self {
        DistError::MissingInput {
            what,
            path: path.into(),
        }
    }
}

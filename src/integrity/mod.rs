// ABOUTME: Non-mutating validation of a store against its manifest and ground truth
// ABOUTME: Row counts, foreign keys, spot checks, view smoke tests and an informational POS report

pub mod ground_truth;

pub use ground_truth::{Expected, GroundTruth, SpotCheck};

use crate::error::DistError;
use crate::manifest::Manifest;
use crate::migration::restore::set_pragma;
use crate::sqlite::reader::get_table_row_count;
use crate::utils::quote_ident;
use anyhow::{Context, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::fmt;

/// What kind of store is being validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// A store rebuilt from the distribution: counts must match exactly and
    /// any foreign-key violation is a failure
    Reconstructed,
    /// The original source database: pre-filter orphans make larger counts and
    /// foreign-key violations expected, so both are warnings
    Source,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    RowCount,
    ForeignKeys,
    SpotCheck,
    View,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckKind::RowCount => "row count",
            CheckKind::ForeignKeys => "foreign keys",
            CheckKind::SpotCheck => "spot check",
            CheckKind::View => "view",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub kind: CheckKind,
    pub label: String,
    pub passed: bool,
    pub detail: String,
}

/// One row of `PRAGMA foreign_key_check`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FkViolation {
    pub table: String,
    pub rowid: Option<i64>,
    pub parent: String,
    pub fk_index: i64,
}

/// Collected results of a validation run
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checks: Vec<CheckOutcome>,
    pub warnings: Vec<String>,
    /// Top active part-of-speech tags by word count
    pub pos_distribution: Vec<(String, u64)>,
}

impl ValidationReport {
    fn pass(&mut self, kind: CheckKind, label: impl Into<String>, detail: impl Into<String>) {
        let outcome = CheckOutcome {
            kind,
            label: label.into(),
            passed: true,
            detail: detail.into(),
        };
        tracing::info!("  ✓ {} {}", outcome.label, outcome.detail);
        self.checks.push(outcome);
    }

    fn fail(&mut self, kind: CheckKind, label: impl Into<String>, detail: impl Into<String>) {
        let outcome = CheckOutcome {
            kind,
            label: label.into(),
            passed: false,
            detail: detail.into(),
        };
        tracing::error!("  ✗ {}: {}", outcome.label, outcome.detail);
        self.checks.push(outcome);
    }

    fn warn(&mut self, message: String) {
        tracing::warn!("  ⚠ {}", message);
        self.warnings.push(message);
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.checks.iter().filter(|c| !c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckOutcome> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// `Err(DistError::ValidationFailed)` when any check failed
    pub fn into_result(self) -> Result<Self> {
        if self.failed() == 0 {
            return Ok(self);
        }
        let labels: Vec<String> = self
            .failures()
            .map(|c| format!("{} ({})", c.label, c.kind))
            .collect();
        Err(anyhow::Error::from(DistError::ValidationFailed {
            failed: self.failed(),
            total: self.total(),
        })
        .context(format!("Failed checks: {}", labels.join(", "))))
    }
}

/// Runs the validation battery against one open store
pub struct IntegrityValidator<'a> {
    conn: &'a Connection,
    mode: ValidationMode,
    ground_truth: &'a GroundTruth,
    skip_fk: bool,
    unloaded: BTreeSet<String>,
}

impl<'a> IntegrityValidator<'a> {
    pub fn new(conn: &'a Connection, mode: ValidationMode, ground_truth: &'a GroundTruth) -> Self {
        Self {
            conn,
            mode,
            ground_truth,
            skip_fk: false,
            unloaded: BTreeSet::new(),
        }
    }

    /// Tables the loader skipped because their file was missing
    ///
    /// A skipped table the manifest records as empty is reported as a warning.
    /// Any other skipped table still goes through the row-count check and
    /// fails it as a shortfall.
    pub fn with_unloaded_tables(mut self, tables: impl IntoIterator<Item = String>) -> Self {
        self.unloaded.extend(tables);
        self
    }

    /// Skip the foreign-key scan (slow on large source databases)
    pub fn skip_foreign_keys(mut self, skip: bool) -> Self {
        self.skip_fk = skip;
        self
    }

    /// Run every check and collect the outcomes
    ///
    /// Only errors that prevent checking at all (such as a broken connection)
    /// are returned as `Err`; individual check failures are recorded in the
    /// report. Call [`ValidationReport::into_result`] to turn failures into an
    /// error.
    pub fn run(&self, manifest: &Manifest) -> Result<ValidationReport> {
        let mut report = ValidationReport::default();

        tracing::info!("=== [1] Row count verification ===");
        self.check_row_counts(manifest, &mut report);

        tracing::info!("=== [2] Foreign key integrity ===");
        if self.skip_fk {
            tracing::info!("  SKIP  foreign key check (--skip-fk)");
        } else {
            self.check_foreign_keys(&mut report)?;
        }

        tracing::info!("=== [3] Spot checks (ground-truth values) ===");
        self.run_spot_checks(&mut report);

        tracing::info!("=== [4] View smoke tests ===");
        self.check_views(&mut report);

        if self.ground_truth.pos_report {
            tracing::info!("=== [5] Part-of-speech distribution ===");
            match pos_distribution(self.conn, 10) {
                Ok(rows) => {
                    for (tag, count) in &rows {
                        tracing::info!("  {:8} {:>10}", tag, count);
                    }
                    report.pos_distribution = rows;
                }
                Err(e) => tracing::debug!("POS distribution unavailable: {:#}", e),
            }
        }

        tracing::info!(
            "=== RESULT: {}/{} checks passed ===",
            report.passed(),
            report.total()
        );
        Ok(report)
    }

    fn check_row_counts(&self, manifest: &Manifest, report: &mut ValidationReport) {
        let mut matched = 0usize;
        for (table, entry) in &manifest.tables {
            if self.unloaded.contains(table) && entry.rows == 0 {
                report.warn(format!(
                    "{}: not loaded (file missing), manifest records no rows",
                    table
                ));
                continue;
            }
            let expected = entry.rows;
            let actual = match get_table_row_count(self.conn, table) {
                Ok(actual) => actual,
                Err(e) => {
                    report.fail(CheckKind::RowCount, table.as_str(), format!("{:#}", e));
                    continue;
                }
            };

            if actual == expected {
                matched += 1;
                report.checks.push(CheckOutcome {
                    kind: CheckKind::RowCount,
                    label: table.clone(),
                    passed: true,
                    detail: format!("{} rows", actual),
                });
            } else if actual < expected {
                let err = DistError::RowCountShortfall {
                    table: table.clone(),
                    expected,
                    actual,
                };
                report.fail(CheckKind::RowCount, table.as_str(), err.to_string());
            } else if self.mode == ValidationMode::Source {
                matched += 1;
                report.checks.push(CheckOutcome {
                    kind: CheckKind::RowCount,
                    label: table.clone(),
                    passed: true,
                    detail: format!("{} rows ({} expected)", actual, expected),
                });
                report.warn(format!(
                    "{}: manifest={}, source={} (+{} orphaned rows filtered on export)",
                    table,
                    expected,
                    actual,
                    actual - expected
                ));
            } else {
                report.fail(
                    CheckKind::RowCount,
                    table.as_str(),
                    format!("{} rows, manifest expects exactly {}", actual, expected),
                );
            }
        }
        tracing::info!(
            "  {}/{} tables match expected row counts",
            matched,
            manifest.tables.len()
        );
    }

    fn check_foreign_keys(&self, report: &mut ValidationReport) -> Result<()> {
        let violations = foreign_key_violations(self.conn, None)?;
        if violations.is_empty() {
            report.pass(CheckKind::ForeignKeys, "No FK violations", "");
            return Ok(());
        }

        let err = DistError::ReferentialViolation {
            count: violations.len(),
        };
        for v in violations.iter().take(5) {
            tracing::debug!(
                "    {} rowid={:?} -> {} (fk #{})",
                v.table,
                v.rowid,
                v.parent,
                v.fk_index
            );
        }

        match self.mode {
            ValidationMode::Reconstructed => {
                report.fail(CheckKind::ForeignKeys, "Foreign key check", err.to_string());
            }
            ValidationMode::Source => {
                report.checks.push(CheckOutcome {
                    kind: CheckKind::ForeignKeys,
                    label: "Foreign key check".into(),
                    passed: true,
                    detail: err.to_string(),
                });
                report.warn(format!(
                    "{} FK violation(s), expected in the source database; \
                     orphan rows are excluded on export",
                    violations.len()
                ));
            }
        }
        Ok(())
    }

    fn run_spot_checks(&self, report: &mut ValidationReport) {
        for check in &self.ground_truth.spot_checks {
            match first_value(self.conn, &check.sql) {
                Ok(Some(actual)) if check.expected.matches(&actual) => {
                    report.pass(CheckKind::SpotCheck, check.label.as_str(), "");
                }
                Ok(actual) => report.fail(
                    CheckKind::SpotCheck,
                    check.label.as_str(),
                    format!("expected {}, got {:?}", check.expected, actual),
                ),
                Err(e) => report.fail(
                    CheckKind::SpotCheck,
                    check.label.as_str(),
                    format!("{:#}", e),
                ),
            }
        }
    }

    fn check_views(&self, report: &mut ValidationReport) {
        for view in &self.ground_truth.nonempty_views {
            let label = format!("View {}", view);
            match get_table_row_count(self.conn, view) {
                Ok(count) if count > 0 => {
                    report.pass(CheckKind::View, label, format!("({} rows)", count))
                }
                Ok(_) => report.fail(CheckKind::View, label, "returned 0 rows"),
                Err(e) => report.fail(CheckKind::View, label, format!("{:#}", e)),
            }
        }
    }
}

/// Enable enforcement and list foreign-key violations, optionally for one table
pub fn foreign_key_violations(conn: &Connection, table: Option<&str>) -> Result<Vec<FkViolation>> {
    set_pragma(conn, "foreign_keys", "ON")?;

    let sql = match table {
        Some(t) => format!("PRAGMA foreign_key_check({})", quote_ident(t)),
        None => "PRAGMA foreign_key_check".to_string(),
    };
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare foreign key check")?;
    let violations = stmt
        .query_map([], |row| {
            Ok(FkViolation {
                table: row.get(0)?,
                rowid: row.get(1)?,
                parent: row.get(2)?,
                fk_index: row.get(3)?,
            })
        })
        .context("Failed to run foreign key check")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to collect foreign key violations")?;

    Ok(violations)
}

/// `PRAGMA integrity_check` result; `"ok"` for a sound store
pub fn integrity_check(conn: &Connection) -> Result<String> {
    conn.query_row("PRAGMA integrity_check", [], |row| row.get::<_, String>(0))
        .context("Failed to run integrity check")
}

/// Top `limit` active part-of-speech tags by number of words
pub fn pos_distribution(conn: &Connection, limit: usize) -> Result<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT p.pos_abbreviation, COUNT(*) AS cnt
         FROM Words w
         JOIN PartOfSpeech p ON w.part_of_speech = p.pos_id
         WHERE p.is_active = 1
         GROUP BY p.pos_abbreviation
         ORDER BY cnt DESC, p.pos_abbreviation
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn first_value(conn: &Connection, sql: &str) -> Result<Option<Value>> {
    conn.query_row(sql, [], |row| row.get::<_, Value>(0))
        .optional()
        .with_context(|| format!("Spot check query failed: {}", sql.trim()))
}

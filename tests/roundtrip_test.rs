// ABOUTME: Integration tests for the export -> reconstruct -> validate round trip
// ABOUTME: Uses a fixture pronunciation database with orphan rows and a small category threshold

mod common;

use common::{
    count_rows, create_fixture_db, fk_violation_count, test_config, RELATIONSHIP_ORPHANS,
    SYNONYM_ORPHANS, VARIANT_ORPHANS,
};
use rusqlite::types::Value;
use rusqlite::Connection;
use sqlite_dist::commands::{
    export, reconstruct, validate, ExportOptions, PipelineState, ReconstructOptions,
    ValidateOptions,
};
use sqlite_dist::error::DistError;
use sqlite_dist::integrity::{GroundTruth, ValidationMode};
use sqlite_dist::manifest::{Category, Manifest};
use sqlite_dist::migration::checksum::sha256_file;
use sqlite_dist::remote::FetchMode;
use sqlite_dist::table_rules::TableRules;
use std::fs;
use std::path::{Path, PathBuf};

const THRESHOLD: u64 = 200;

fn export_fixture(dir: &Path) -> (PathBuf, PathBuf, Manifest) {
    let db = create_fixture_db(dir);
    let out = dir.join("dist");
    let manifest = export(
        &ExportOptions {
            db: db.clone(),
            out: out.clone(),
            skip_large: false,
        },
        &test_config(THRESHOLD),
        &TableRules::pronunciation_defaults(),
    )
    .expect("export failed");
    (db, out, manifest)
}

fn reconstruct_options(
    root: &Path,
    output: &Path,
    ground_truth: GroundTruth,
) -> ReconstructOptions {
    ReconstructOptions {
        root: root.to_path_buf(),
        output: output.to_path_buf(),
        mode: FetchMode::Local,
        ground_truth,
    }
}

#[tokio::test]
async fn test_full_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (source, root, manifest) = export_fixture(dir.path());

    // Skipped tables are absent, large tables land in data/release/
    assert!(!manifest.tables.contains_key("AntonymCache"));
    assert_eq!(manifest.tables["heteronym_groups"].category, Category::Lookup);
    assert_eq!(
        manifest.tables["heteronym_pronunciations"].category,
        Category::Large
    );
    assert_eq!(
        manifest.tables["IpaAllowedChars"].parquet_path,
        "data/release/IpaAllowedChars.parquet"
    );

    // A stale file at the output path is replaced
    let output = dir.path().join("rebuilt.db");
    fs::write(&output, b"not a database").unwrap();

    let summary = reconstruct(
        &reconstruct_options(&root, &output, GroundTruth::pronunciation()),
        &test_config(THRESHOLD),
    )
    .await
    .expect("reconstruct failed");

    assert_eq!(summary.tables_loaded, manifest.tables.len());
    assert!(summary.warnings.is_empty());
    assert_eq!(summary.report.failed(), 0);
    assert_eq!(summary.history.last(), Some(&PipelineState::Done));

    // Unfiltered tables come back exactly; filtered ones lose only their orphans
    for (table, entry) in &manifest.tables {
        let rebuilt = count_rows(&output, table);
        assert_eq!(rebuilt, entry.rows, "row count of {}", table);
        if entry.filter_override.is_none() {
            assert_eq!(rebuilt, count_rows(&source, table), "source count of {}", table);
        }
    }
    assert_eq!(
        manifest.tables["Variants"].rows,
        count_rows(&source, "Variants") - VARIANT_ORPHANS
    );
    assert_eq!(
        manifest.tables["SemanticRelationships"].rows,
        count_rows(&source, "SemanticRelationships") - RELATIONSHIP_ORPHANS
    );
    assert_eq!(
        manifest.tables["SynonymCache"].rows,
        count_rows(&source, "SynonymCache") - SYNONYM_ORPHANS
    );

    // Orphans exist in the source but not in the rebuilt store
    assert_eq!(fk_violation_count(&source), 4);
    assert_eq!(fk_violation_count(&output), 0);

    let conn = Connection::open(&output).unwrap();
    let nn: String = conn
        .query_row(
            "SELECT pos_abbreviation FROM PartOfSpeech WHERE pos_id = 9",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(nn, "NN");

    let audio: Value = conn
        .query_row("SELECT audio FROM Variants WHERE variant_id = 2", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(audio, Value::Blob(vec![0xca, 0xfe]));

    // Unparsable text in a REAL column becomes NULL; real values survive
    let frequencies: Vec<Option<f64>> = conn
        .prepare("SELECT frequency FROM Words WHERE word_id IN (1, 5) ORDER BY word_id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(frequencies, vec![Some(0.75), None]);

    let objects: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('index', 'trigger', 'view') \
             AND name NOT LIKE 'sqlite_%'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(objects, 8);

    let journal: String = conn
        .query_row("PRAGMA journal_mode", [], |row| row.get(0))
        .unwrap();
    assert_eq!(journal.to_lowercase(), "delete");
    drop(conn);

    // The standalone validator agrees
    let report = validate(&ValidateOptions {
        db: output.clone(),
        manifest: root.join("schema/table_manifest.json"),
        skip_fk: false,
        mode: ValidationMode::Reconstructed,
        ground_truth: GroundTruth::pronunciation(),
    })
    .expect("validation of rebuilt store failed");
    assert!(report.warnings.is_empty());
    assert_eq!(report.pos_distribution.first().map(|(_, n)| *n), Some(2));
}

#[test]
fn test_source_validation_downgrades_orphans() {
    let dir = tempfile::tempdir().unwrap();
    let (source, root, _) = export_fixture(dir.path());
    let manifest_path = root.join("schema/table_manifest.json");

    let report = validate(&ValidateOptions {
        db: source.clone(),
        manifest: manifest_path.clone(),
        skip_fk: false,
        mode: ValidationMode::Source,
        ground_truth: GroundTruth::pronunciation(),
    })
    .expect("source validation should pass with warnings");
    assert_eq!(report.failed(), 0);
    // Three tables with surplus rows plus one FK summary
    assert_eq!(report.warnings.len(), 4);

    // The same store judged as a reconstruction fails
    let err = validate(&ValidateOptions {
        db: source,
        manifest: manifest_path,
        skip_fk: false,
        mode: ValidationMode::Reconstructed,
        ground_truth: GroundTruth::none(),
    })
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DistError>(),
        Some(DistError::ValidationFailed { failed: 4, .. })
    ));
}

#[test]
fn test_export_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = create_fixture_db(dir.path());
    let config = test_config(THRESHOLD);
    let rules = TableRules::pronunciation_defaults();

    let run = |name: &str| {
        export(
            &ExportOptions {
                db: db.clone(),
                out: dir.path().join(name),
                skip_large: false,
            },
            &config,
            &rules,
        )
        .unwrap()
    };
    let first = run("a");
    let second = run("b");

    assert_eq!(first, second);
    for (table, entry) in &first.tables {
        let path = dir.path().join("b").join(&entry.parquet_path);
        assert_eq!(
            sha256_file(&path).unwrap(),
            entry.sha256,
            "recomputed checksum of {}",
            table
        );
    }
}

#[test]
fn test_category_threshold_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("boundary.db");
    Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TABLE at_threshold (id INTEGER PRIMARY KEY);
             CREATE TABLE over_threshold (id INTEGER PRIMARY KEY);
             WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 5001)
             INSERT INTO over_threshold SELECT i FROM n;
             INSERT INTO at_threshold SELECT id FROM over_threshold WHERE id <= 5000;",
        )
        .unwrap();

    let config = sqlite_dist::config::DistConfig {
        export_time: 1,
        ..Default::default()
    };
    let manifest = export(
        &ExportOptions {
            db,
            out: dir.path().join("dist"),
            skip_large: false,
        },
        &config,
        &TableRules::default(),
    )
    .unwrap();

    assert_eq!(manifest.export_meta.in_git_threshold, 5000);
    assert_eq!(manifest.tables["at_threshold"].rows, 5000);
    assert_eq!(manifest.tables["at_threshold"].category, Category::Lookup);
    assert_eq!(manifest.tables["over_threshold"].rows, 5001);
    assert_eq!(manifest.tables["over_threshold"].category, Category::Large);
}

#[tokio::test]
async fn test_missing_large_file_fails_row_count() {
    let dir = tempfile::tempdir().unwrap();
    let (_, root, manifest) = export_fixture(dir.path());
    fs::remove_file(root.join(&manifest.tables["IpaAllowedChars"].parquet_path)).unwrap();

    let output = dir.path().join("partial.db");
    let err = reconstruct(
        &reconstruct_options(&root, &output, GroundTruth::none()),
        &test_config(THRESHOLD),
    )
    .await
    .expect_err("a table with no rows loaded must fail validation");

    assert!(matches!(
        err.downcast_ref::<DistError>(),
        Some(DistError::ValidationFailed { failed: 1, .. })
    ));
    let message = format!("{:#}", err);
    assert!(message.contains("IpaAllowedChars (row count)"), "{}", message);
    assert!(message.contains("file missing"), "{}", message);

    // The remaining tables were still loaded before validation failed
    assert_eq!(count_rows(&output, "IpaAllowedChars"), 0);
    assert_eq!(count_rows(&output, "heteronym_pronunciations"), 235);
}

#[tokio::test]
async fn test_tampered_local_file_fails_reconstruction() {
    let dir = tempfile::tempdir().unwrap();
    let (_, root, manifest) = export_fixture(dir.path());
    let path = root.join(&manifest.tables["heteronym_pronunciations"].parquet_path);
    let mut bytes = fs::read(&path).unwrap();
    bytes.push(0);
    fs::write(&path, bytes).unwrap();

    let err = reconstruct(
        &reconstruct_options(&root, &dir.path().join("bad.db"), GroundTruth::none()),
        &test_config(THRESHOLD),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DistError>(),
        Some(DistError::ChecksumMismatch { .. })
    ));
}

#[tokio::test]
async fn test_missing_schema_leaves_existing_output_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let (_, root, _) = export_fixture(dir.path());
    fs::remove_file(root.join("schema/schema.sql")).unwrap();

    let output = dir.path().join("precious.db");
    Connection::open(&output)
        .unwrap()
        .execute_batch("CREATE TABLE keep (id INTEGER PRIMARY KEY); INSERT INTO keep VALUES (7);")
        .unwrap();
    let before = sha256_file(&output).unwrap();

    let err = reconstruct(
        &reconstruct_options(&root, &output, GroundTruth::none()),
        &test_config(THRESHOLD),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DistError>(),
        Some(DistError::MissingInput { what: "schema script", .. })
    ));

    assert_eq!(sha256_file(&output).unwrap(), before);
    assert_eq!(count_rows(&output, "keep"), 1);
}

#[tokio::test]
async fn test_not_null_column_with_mixed_values_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("mixed.db");
    Connection::open(&db)
        .unwrap()
        .execute_batch(
            "CREATE TABLE counts (id INTEGER PRIMARY KEY, n INTEGER NOT NULL);
             INSERT INTO counts VALUES (1, 1), (2, 'n/a'), (3, 2.5);",
        )
        .unwrap();

    let root = dir.path().join("dist");
    let manifest = export(
        &ExportOptions {
            db,
            out: root.clone(),
            skip_large: false,
        },
        &test_config(THRESHOLD),
        &TableRules::default(),
    )
    .unwrap();
    assert_eq!(manifest.tables["counts"].rows, 3);

    let output = dir.path().join("mixed_rebuilt.db");
    reconstruct(
        &reconstruct_options(&root, &output, GroundTruth::none()),
        &test_config(THRESHOLD),
    )
    .await
    .expect("every exported row must load back");

    assert_eq!(count_rows(&output, "counts"), 3);
    let conn = Connection::open(&output).unwrap();
    let rows: Vec<(i64, String, Value)> = conn
        .prepare("SELECT id, typeof(n), n FROM counts ORDER BY id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![
            (1, "integer".to_string(), Value::Integer(1)),
            (2, "text".to_string(), Value::Text("n/a".into())),
            (3, "real".to_string(), Value::Real(2.5)),
        ]
    );
}

// ABOUTME: Shared fixtures for integration tests
// ABOUTME: Builds a small pronunciation database with the same shape and orphan rows as production

#![allow(dead_code)]

use rusqlite::Connection;
use sqlite_dist::config::DistConfig;
use std::path::{Path, PathBuf};

/// Orphan rows planted in the fixture, per filtered table
pub const VARIANT_ORPHANS: u64 = 2;
pub const RELATIONSHIP_ORPHANS: u64 = 1;
pub const SYNONYM_ORPHANS: u64 = 1;

/// Create the fixture database at `dir/pronunciation.db`
///
/// Contains every table, view and fact the default ground-truth battery checks,
/// plus orphan rows in Variants, SemanticRelationships and SynonymCache that
/// reference missing words (inserted with enforcement off, as in production).
pub fn create_fixture_db(dir: &Path) -> PathBuf {
    let path = dir.join("pronunciation.db");
    let conn = Connection::open(&path).expect("Failed to create fixture database");
    conn.execute_batch(FIXTURE_SQL)
        .expect("Failed to populate fixture database");
    path
}

/// Config with a fixed export time and a small threshold so both categories occur
pub fn test_config(threshold: u64) -> DistConfig {
    DistConfig {
        category_threshold: threshold,
        sample_size: 10,
        export_batch_rows: 64,
        row_group_size: 128,
        load_batch_rows: 50,
        source_id: "pronunciation.db".to_string(),
        export_time: 1_700_000_000,
        ..DistConfig::default()
    }
}

pub fn count_rows(db: &Path, table: &str) -> u64 {
    let conn = Connection::open(db).expect("Failed to open database");
    conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get::<_, i64>(0)
    })
    .expect("Failed to count rows") as u64
}

pub fn fk_violation_count(db: &Path) -> usize {
    let conn = Connection::open(db).expect("Failed to open database");
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    let mut stmt = conn.prepare("PRAGMA foreign_key_check").unwrap();
    let rows = stmt.query_map([], |_| Ok(())).unwrap();
    rows.count()
}

const FIXTURE_SQL: &str = "
PRAGMA foreign_keys = OFF;

CREATE TABLE Languages (
    language_id INTEGER PRIMARY KEY,
    language_code TEXT NOT NULL,
    name TEXT
);

CREATE TABLE PartOfSpeech (
    pos_id INTEGER PRIMARY KEY,
    pos_abbreviation TEXT NOT NULL,
    description TEXT,
    is_active INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE Words (
    word_id INTEGER PRIMARY KEY,
    word TEXT NOT NULL,
    language_id INTEGER REFERENCES Languages(language_id),
    part_of_speech INTEGER REFERENCES PartOfSpeech(pos_id),
    frequency REAL,
    notes
);

CREATE TABLE Variants (
    variant_id INTEGER PRIMARY KEY,
    word_id INTEGER NOT NULL REFERENCES Words(word_id),
    ipa TEXT NOT NULL,
    stress_pattern TEXT NOT NULL,
    syllable_count INTEGER NOT NULL,
    audio BLOB
);

CREATE TABLE SemanticRelationships (
    relationship_id INTEGER PRIMARY KEY,
    source_word_id INTEGER NOT NULL REFERENCES Words(word_id),
    target_word_id INTEGER NOT NULL REFERENCES Words(word_id),
    relation TEXT
);

CREATE TABLE SynonymCache (
    cache_id INTEGER PRIMARY KEY,
    word_id INTEGER NOT NULL REFERENCES Words(word_id),
    synonym_word_id INTEGER NOT NULL REFERENCES Words(word_id),
    score DOUBLE PRECISION
);

CREATE TABLE heteronym_groups (
    group_id INTEGER PRIMARY KEY,
    spelling TEXT NOT NULL
);

CREATE TABLE heteronym_pronunciations (
    id INTEGER PRIMARY KEY,
    group_id INTEGER NOT NULL REFERENCES heteronym_groups(group_id),
    ipa VARCHAR(64) NOT NULL
);

CREATE TABLE IpaAllowedChars (
    char_id INTEGER PRIMARY KEY,
    symbol TEXT NOT NULL
);

-- Known-empty table, skipped by the default rules
CREATE TABLE AntonymCache (
    word_id INTEGER,
    antonym_word_id INTEGER
);

CREATE INDEX idx_variants_word ON Variants(word_id);
CREATE INDEX idx_words_word ON Words(word);

CREATE TRIGGER trg_words_no_blank BEFORE UPDATE OF word ON Words
WHEN NEW.word = ''
BEGIN
    SELECT RAISE(ABORT, 'blank word');
END;

CREATE VIEW POSLookup AS
    SELECT pos_id, pos_abbreviation AS abbreviation, description
    FROM PartOfSpeech WHERE is_active = 1;

CREATE VIEW Pronunciations AS
    SELECT w.word, v.ipa, v.stress_pattern
    FROM Words w JOIN Variants v ON v.word_id = w.word_id;

CREATE VIEW v_StressPatterns AS
    SELECT stress_pattern, COUNT(*) AS n FROM Variants GROUP BY stress_pattern;

CREATE VIEW v_RhymeFinder AS
    SELECT w.word, substr(v.ipa, -2) AS rhyme
    FROM Words w JOIN Variants v ON v.word_id = w.word_id;

CREATE VIEW unique_pronunciations AS
    SELECT DISTINCT ipa FROM Variants;

INSERT INTO Languages VALUES (1, 'en', 'English'), (2, 'fr', 'French');

INSERT INTO PartOfSpeech VALUES
    (1, 'N', 'legacy noun', 0),
    (9, 'NN', 'noun', 1),
    (11, 'NNP', 'proper noun', 1),
    (14, 'VBD', 'verb, past tense', 1),
    (20, 'JJ', 'adjective', 1),
    (27, 'VB', 'verb, base form', 1);

INSERT INTO Words VALUES
    (1, 'desert', 1, 9, 0.75, NULL),
    (2, 'desert', 1, 27, 0.25, NULL),
    (3, 'record', 1, 9, 1.5, 'noun sense'),
    (4, 'London', 1, 11, 3, X'00ff'),
    (5, 'walked', 1, 14, 'n/a', 42),
    (6, 'green', 1, 20, NULL, NULL);

INSERT INTO Variants VALUES
    (1, 1, 'ˈdɛzərt', '1-0', 2, NULL),
    (2, 2, 'dɪˈzɜrt', '0-1', 2, X'cafe'),
    (3, 3, 'rɪˈkɔrd', '0-1', 2, NULL),
    (4, 4, 'ˈlʌndən', '1-0', 2, NULL),
    (5, 5, 'wɔkt', '1', 1, NULL),
    (6, 6, 'ɡrin', '1', 1, NULL),
    (7, 404, 'ɔrfən', '1-0', 2, NULL),
    (8, 405, 'ɡoʊst', '1', 1, NULL);

INSERT INTO SemanticRelationships VALUES
    (1, 1, 2, 'homograph'),
    (2, 3, 999, 'orphan'),
    (3, 6, 5, 'related');

INSERT INTO SynonymCache VALUES
    (1, 1, 2, 0.5),
    (2, 998, 1, 0.1);

WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 116)
INSERT INTO heteronym_groups SELECT i, 'spelling_' || i FROM n;

WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 235)
INSERT INTO heteronym_pronunciations SELECT i, ((i - 1) % 116) + 1, 'ipa_' || i FROM n;

WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 611)
INSERT INTO IpaAllowedChars SELECT i, char(i + 160) FROM n;
";

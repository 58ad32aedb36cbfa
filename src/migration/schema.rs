// ABOUTME: DDL script extraction for a SQLite store and the pragma-free replay form
// ABOUTME: Tables, then indexes, triggers and views, each grouped under a banner

use crate::sqlite::reader::{list_schema_objects, SchemaObject};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::fs;
use std::path::Path;

/// Render the ordered DDL script for a set of schema objects
///
/// `objects` must already be in replay order (see
/// [`list_schema_objects`]). Each statement is emitted verbatim with a single
/// terminating `;`. The two leading pragmas are informational for anyone
/// replaying the script by hand; [`strip_pragmas`] removes them on the
/// automated path.
pub fn render_schema_script(objects: &[SchemaObject], source_label: &str) -> String {
    let mut script = String::new();
    script.push_str("-- ============================================================\n");
    script.push_str(&format!("-- {} - full DDL\n", source_label));
    script.push_str("-- Generated by sqlite-dist export\n");
    script.push_str("-- ============================================================\n\n");
    script.push_str("PRAGMA journal_mode = WAL;\n");
    script.push_str("PRAGMA foreign_keys = OFF;  -- re-enabled by reconstruct after bulk load\n\n");

    let mut current_kind: Option<&str> = None;
    for object in objects {
        if current_kind != Some(object.object_type.as_str()) {
            script.push_str(&format!(
                "\n-- ---- {}S ----\n\n",
                object.object_type.to_uppercase()
            ));
            current_kind = Some(object.object_type.as_str());
        }
        let sql = object.sql.trim().trim_end_matches(';').trim_end();
        script.push_str(sql);
        script.push_str(";\n\n");
    }

    script
}

/// Write the DDL script for every user object of `conn` to `out_path`
///
/// # Returns
///
/// Number of schema objects written
pub fn extract_schema(conn: &Connection, out_path: &Path, source_label: &str) -> Result<usize> {
    let objects = list_schema_objects(conn)?;

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create schema directory {}", parent.display()))?;
    }

    let script = render_schema_script(&objects, source_label);
    fs::write(out_path, script.as_bytes())
        .with_context(|| format!("Failed to write schema script to {}", out_path.display()))?;

    tracing::info!(
        "  Schema -> {} ({} objects, {} bytes)",
        out_path.display(),
        objects.len(),
        script.len()
    );

    Ok(objects.len())
}

/// Remove top-level `PRAGMA` statements from a DDL script
///
/// Bulk-load pragmas are applied explicitly before replay; leaving them in the
/// script would switch enforcement back and forth mid-replay.
///
/// A line is dropped only when it starts a new statement (everything before
/// it ended with `;`) and its first word is exactly `PRAGMA`, so a column such
/// as `pragma_name TEXT` inside a multi-line `CREATE TABLE` is kept. A pragma
/// spanning several lines is dropped up to its terminating `;`.
pub fn strip_pragmas(script: &str) -> String {
    let mut kept = Vec::new();
    let mut at_statement_start = true;
    let mut in_pragma = false;

    for line in script.lines() {
        let code = strip_line_comment(line).trim();

        if in_pragma {
            in_pragma = !code.ends_with(';');
            continue;
        }
        if code.is_empty() {
            kept.push(line);
            continue;
        }
        if at_statement_start && starts_with_pragma(code) {
            in_pragma = !code.ends_with(';');
            continue;
        }

        kept.push(line);
        at_statement_start = code.ends_with(';');
    }

    kept.join("\n")
}

fn starts_with_pragma(code: &str) -> bool {
    code.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .next()
        .map_or(false, |word| word.eq_ignore_ascii_case("PRAGMA"))
}

/// Text before a `--` comment; quotes are not tracked, which only matters for
/// a `--` inside a string literal at the end of a line
fn strip_line_comment(line: &str) -> &str {
    match line.find("--") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE Words (word_id INTEGER PRIMARY KEY, word TEXT NOT NULL);
             CREATE TABLE Variants (
                 variant_id INTEGER PRIMARY KEY,
                 word_id INTEGER REFERENCES Words(word_id),
                 stress_pattern TEXT
             );
             CREATE INDEX idx_variants_word ON Variants(word_id);
             CREATE VIEW v_words AS SELECT word FROM Words;
             CREATE TRIGGER trg_words_lower AFTER INSERT ON Words
                 BEGIN UPDATE Words SET word = lower(NEW.word) WHERE word_id = NEW.word_id; END;",
        )
        .unwrap();
        conn
    }

    #[test]
    fn script_groups_objects_by_kind_in_replay_order() {
        let conn = fixture();
        let objects = list_schema_objects(&conn).unwrap();
        let script = render_schema_script(&objects, "fixture.db");

        let tables = script.find("-- ---- TABLES ----").unwrap();
        let indexes = script.find("-- ---- INDEXS ----").unwrap();
        let triggers = script.find("-- ---- TRIGGERS ----").unwrap();
        let views = script.find("-- ---- VIEWS ----").unwrap();
        assert!(tables < indexes && indexes < triggers && triggers < views);
        assert!(script.contains("CREATE VIEW v_words AS SELECT word FROM Words;\n"));
        assert!(!script.contains(";;"));
    }

    #[test]
    fn stripped_script_replays_into_empty_store() {
        let conn = fixture();
        let objects = list_schema_objects(&conn).unwrap();
        let replay = strip_pragmas(&render_schema_script(&objects, "fixture.db"));
        assert!(!replay.to_uppercase().contains("PRAGMA"));

        let target = Connection::open_in_memory().unwrap();
        target.execute_batch(&replay).unwrap();
        let replayed = list_schema_objects(&target).unwrap();
        assert_eq!(replayed, objects);
    }

    #[test]
    fn extract_schema_writes_file() {
        let conn = fixture();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema").join("schema.sql");

        let written = extract_schema(&conn, &path, "fixture.db").unwrap();
        assert_eq!(written, 5);
        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("-- ===="));
        assert!(contents.contains("PRAGMA foreign_keys = OFF;"));
    }

    #[test]
    fn strip_pragmas_keeps_columns_named_like_pragmas() {
        let script = "PRAGMA foreign_keys = OFF;  -- header\n\
                      CREATE TABLE settings (\n\
                      \x20 id INTEGER PRIMARY KEY,\n\
                      \x20 pragma_name TEXT,\n\
                      \x20 pragma TEXT\n\
                      );\n\
                      PRAGMA\n\
                      \x20 cache_size = 10;\n\
                      CREATE TABLE t (x);";
        assert_eq!(
            strip_pragmas(script),
            "CREATE TABLE settings (\n  id INTEGER PRIMARY KEY,\n  pragma_name TEXT,\n  pragma TEXT\n);\nCREATE TABLE t (x);"
        );
    }

    #[test]
    fn table_with_pragma_prefixed_column_replays() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE settings (\n  id INTEGER PRIMARY KEY,\n  pragma_name TEXT\n);",
        )
        .unwrap();
        let objects = list_schema_objects(&conn).unwrap();
        let replay = strip_pragmas(&render_schema_script(&objects, "settings.db"));

        let target = Connection::open_in_memory().unwrap();
        target.execute_batch(&replay).unwrap();
        let columns: i64 = target
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('settings') WHERE name = 'pragma_name'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(columns, 1);
    }

    #[test]
    fn strip_pragmas_is_case_insensitive() {
        let script = "pragma foreign_keys=ON;\n  PRAGMA cache_size = 10;\nCREATE TABLE t (x);";
        assert_eq!(strip_pragmas(script), "CREATE TABLE t (x);");
    }
}

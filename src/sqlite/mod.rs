// ABOUTME: SQLite access for export, reconstruction and validation
// ABOUTME: Path checks for existing stores plus read-only and fresh writable connections

pub mod converter;
pub mod reader;
pub mod type_map;

use anyhow::{bail, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

/// File extensions accepted for an existing store
const SQLITE_EXTENSIONS: &[&str] = &["db", "sqlite", "sqlite3"];

/// Resolve the path of an existing SQLite store
///
/// The path is canonicalized (following symlinks and `..`), must name a
/// regular file, and must end in `.db`, `.sqlite` or `.sqlite3`. Anything else
/// is rejected before a connection is opened, so a stray argument such as
/// `../../etc/passwd` never reaches SQLite.
///
/// # Examples
///
/// ```no_run
/// # use sqlite_dist::sqlite::validate_sqlite_path;
/// assert!(validate_sqlite_path("pronunciation.db").is_ok());
/// assert!(validate_sqlite_path("../../../etc/passwd").is_err());
/// ```
pub fn validate_sqlite_path(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        bail!("SQLite file path cannot be empty");
    }

    let canonical = path.canonicalize().with_context(|| {
        format!(
            "Failed to resolve SQLite file path '{}'. File may not exist or may not be readable.",
            path.display()
        )
    })?;

    if !canonical.is_file() {
        bail!(
            "Path '{}' is not a regular file (may be a directory)",
            path.display()
        );
    }

    match canonical.extension().and_then(|e| e.to_str()) {
        Some(ext) if SQLITE_EXTENSIONS.contains(&ext) => {}
        Some(ext) => bail!(
            "Invalid SQLite file extension '{}'. Must be .db, .sqlite, or .sqlite3",
            ext
        ),
        None => bail!(
            "SQLite file '{}' has no extension. Must be .db, .sqlite, or .sqlite3",
            path.display()
        ),
    }

    tracing::debug!("Validated SQLite path: {}", canonical.display());
    Ok(canonical)
}

/// Open an existing store read-only
///
/// Export and validation never write to the store they inspect; opening with
/// `SQLITE_OPEN_READ_ONLY` makes that a guarantee rather than a convention.
pub fn open_sqlite(path: impl AsRef<Path>) -> Result<Connection> {
    let canonical = validate_sqlite_path(path)?;
    tracing::info!("Opening SQLite database: {}", canonical.display());

    let conn = Connection::open_with_flags(&canonical, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open SQLite database: {}", canonical.display()))?;

    // A file that is not a database only fails on first read
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
        row.get::<_, i64>(0)
    })
    .with_context(|| format!("{} is not a readable SQLite database", canonical.display()))?;

    Ok(conn)
}

/// Create a brand-new store at `path`, discarding any existing file
///
/// The database file and its `-wal`/`-shm`/`-journal` companions are removed
/// first, and missing parent directories are created.
pub fn open_fresh_sqlite(path: &Path) -> Result<Connection> {
    for companion in ["", "-wal", "-shm", "-journal"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(companion);
        let candidate = PathBuf::from(candidate);
        if candidate.exists() {
            tracing::info!("Removing existing file {}", candidate.display());
            std::fs::remove_file(&candidate)
                .with_context(|| format!("Failed to remove {}", candidate.display()))?;
        }
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to create SQLite database: {}", path.display()))?;

    tracing::debug!("Created fresh SQLite database at {}", path.display());
    Ok(conn)
}

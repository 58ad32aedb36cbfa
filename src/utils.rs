// ABOUTME: Utility functions for identifier validation and quoting
// ABOUTME: Keeps table and column names safe to splice into generated SQL

use anyhow::{bail, Result};

/// Validate a SQLite identifier (table, column or view name)
///
/// SQLite accepts almost any text as an identifier once it is double-quoted,
/// so the check is deliberately narrow:
/// - Must not be empty or whitespace-only
/// - Must not contain control characters (including NUL)
/// - Must be at most 128 characters
///
/// Identifiers that pass are still always emitted through [`quote_ident`].
///
/// # Examples
///
/// ```
/// # use sqlite_dist::utils::validate_sqlite_identifier;
/// assert!(validate_sqlite_identifier("Words").is_ok());
/// assert!(validate_sqlite_identifier("heteronym_groups").is_ok());
/// assert!(validate_sqlite_identifier("").is_err());
/// assert!(validate_sqlite_identifier("bad\nname").is_err());
/// ```
pub fn validate_sqlite_identifier(identifier: &str) -> Result<()> {
    if identifier.trim().is_empty() {
        bail!("Identifier cannot be empty or whitespace-only");
    }

    if identifier.chars().count() > 128 {
        bail!(
            "Identifier '{}' exceeds maximum length of 128 characters",
            sanitize_identifier(identifier)
        );
    }

    if let Some(c) = identifier.chars().find(|c| c.is_control()) {
        bail!(
            "Identifier '{}' contains control character \\x{:02x}",
            sanitize_identifier(identifier),
            c as u32
        );
    }

    Ok(())
}

/// Quote an identifier for SQLite, doubling any embedded double quotes
///
/// # Examples
///
/// ```
/// # use sqlite_dist::utils::quote_ident;
/// assert_eq!(quote_ident("Words"), "\"Words\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Sanitize an identifier (table name, column name, etc.) for display
///
/// Removes control characters and limits length to prevent log injection attacks
/// and ensure readable error messages.
///
/// **Note**: This is for display purposes only. For SQL safety, use [`quote_ident`].
///
/// # Examples
///
/// ```
/// # use sqlite_dist::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_table"), "normal_table");
/// assert_eq!(sanitize_identifier("table\x00name"), "tablename");
/// assert_eq!(sanitize_identifier("table\nname"), "tablename");
///
/// // Length limit
/// let long_name = "a".repeat(200);
/// assert_eq!(sanitize_identifier(&long_name).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("normal_table"), "normal_table");
        assert_eq!(sanitize_identifier("table\x00name"), "tablename");
        assert_eq!(sanitize_identifier("table\nname"), "tablename");

        let long_name = "a".repeat(200);
        assert_eq!(sanitize_identifier(&long_name).len(), 100);
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("PartOfSpeech"), "\"PartOfSpeech\"");
        assert_eq!(
            quote_ident("x\"; DROP TABLE Words; --"),
            "\"x\"\"; DROP TABLE Words; --\""
        );
    }

    #[test]
    fn test_validate_sqlite_identifier_valid() {
        assert!(validate_sqlite_identifier("Words").is_ok());
        assert!(validate_sqlite_identifier("v_RhymeFinder").is_ok());
        assert!(validate_sqlite_identifier("table with space").is_ok());
        assert!(validate_sqlite_identifier(&"a".repeat(128)).is_ok());
    }

    #[test]
    fn test_validate_sqlite_identifier_invalid() {
        assert!(validate_sqlite_identifier("").is_err());
        assert!(validate_sqlite_identifier("   ").is_err());
        assert!(validate_sqlite_identifier("my\ndb").is_err());
        assert!(validate_sqlite_identifier("my\x00db").is_err());
        assert!(validate_sqlite_identifier(&"a".repeat(129)).is_err());
    }
}

// ABOUTME: Maps SQLite declared column types to the four semantic column kinds
// ABOUTME: Single ordered lookup table consulted once per column at schema-read time

use arrow::datatypes::DataType;
use std::fmt;

/// Semantic kind of an exported column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Integer64,
    Float64,
    Binary,
    String,
}

/// Declared-type spellings that map to a non-string kind.
///
/// Matching is on the normalized spelling: upper-cased, anything from the first
/// `(` dropped, whitespace collapsed. Every spelling absent from this table,
/// including the empty declared type, maps to [`ColumnKind::String`].
const DECLARED_TYPE_KINDS: &[(&str, ColumnKind)] = &[
    ("INTEGER", ColumnKind::Integer64),
    ("INT", ColumnKind::Integer64),
    ("TINYINT", ColumnKind::Integer64),
    ("SMALLINT", ColumnKind::Integer64),
    ("MEDIUMINT", ColumnKind::Integer64),
    ("BIGINT", ColumnKind::Integer64),
    ("UNSIGNED BIG INT", ColumnKind::Integer64),
    ("INT2", ColumnKind::Integer64),
    ("INT8", ColumnKind::Integer64),
    ("REAL", ColumnKind::Float64),
    ("DOUBLE", ColumnKind::Float64),
    ("DOUBLE PRECISION", ColumnKind::Float64),
    ("FLOAT", ColumnKind::Float64),
    ("BLOB", ColumnKind::Binary),
];

impl ColumnKind {
    /// Derive the kind for a declared type such as `"varchar(20)"` or `"BIGINT"`
    pub fn from_declared_type(declared: &str) -> Self {
        let normalized = normalize_declared_type(declared);
        DECLARED_TYPE_KINDS
            .iter()
            .find(|(spelling, _)| *spelling == normalized)
            .map(|(_, kind)| *kind)
            .unwrap_or(ColumnKind::String)
    }

    pub fn arrow_type(self) -> DataType {
        match self {
            ColumnKind::Integer64 => DataType::Int64,
            ColumnKind::Float64 => DataType::Float64,
            ColumnKind::Binary => DataType::Binary,
            ColumnKind::String => DataType::Utf8,
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Integer64 => "int64",
            ColumnKind::Float64 => "float64",
            ColumnKind::Binary => "binary",
            ColumnKind::String => "string",
        };
        f.write_str(name)
    }
}

fn normalize_declared_type(declared: &str) -> String {
    let base = declared.split('(').next().unwrap_or("");
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

// ABOUTME: Conversion between SQLite values and typed Arrow columns
// ABOUTME: Direct lossless casts with a per-batch string fallback, plus the reverse for loading

use crate::sqlite::type_map::ColumnKind;
use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, Float64Array, Float64Builder, Int64Array,
    Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use rusqlite::types::Value;
use std::sync::Arc;

/// Largest integer magnitude an f64 represents exactly (2^53)
const F64_EXACT_INT_LIMIT: u64 = 1 << 53;

/// Whether a single value converts into `kind` without loss
///
/// - Integer64 accepts INTEGER, and REAL values that are integral and in i64 range
/// - Float64 accepts REAL, and INTEGER values with magnitude ≤ 2^53
/// - Binary accepts BLOB, and TEXT (its UTF-8 bytes)
/// - String accepts TEXT only
///
/// NULL is accepted by every kind.
pub fn is_lossless(kind: ColumnKind, value: &Value) -> bool {
    match (kind, value) {
        (_, Value::Null) => true,
        (ColumnKind::Integer64, Value::Integer(_)) => true,
        (ColumnKind::Integer64, Value::Real(f)) => real_as_i64(*f).is_some(),
        (ColumnKind::Float64, Value::Real(_)) => true,
        (ColumnKind::Float64, Value::Integer(i)) => i.unsigned_abs() <= F64_EXACT_INT_LIMIT,
        (ColumnKind::Binary, Value::Blob(_)) => true,
        (ColumnKind::Binary, Value::Text(_)) => true,
        (ColumnKind::String, Value::Text(_)) => true,
        _ => false,
    }
}

/// Build one typed Arrow column from a batch of SQLite values
///
/// If every value passes [`is_lossless`] the column is built directly.
/// Otherwise the whole batch column goes through the string fallback: each
/// value is rendered as text and the text column is cast to the target kind,
/// with unparsable entries becoming null. The fallback never fails.
///
/// # Returns
///
/// The built array and whether the fallback path was taken
pub fn build_column(kind: ColumnKind, values: &[Value]) -> Result<(ArrayRef, bool)> {
    if values.iter().all(|v| is_lossless(kind, v)) {
        return Ok((build_direct(kind, values), false));
    }

    let text: StringArray = values.iter().map(render_text).collect();
    let text: ArrayRef = Arc::new(text);
    let array = match kind {
        ColumnKind::String => text,
        other => cast(&text, &other.arrow_type())
            .with_context(|| format!("Failed to cast fallback text column to {}", other))?,
    };
    Ok((array, true))
}

fn build_direct(kind: ColumnKind, values: &[Value]) -> ArrayRef {
    match kind {
        ColumnKind::Integer64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Integer(i) => builder.append_value(*i),
                    Value::Real(f) => builder.append_option(real_as_i64(*f)),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for value in values {
                match value {
                    Value::Real(f) => builder.append_value(*f),
                    Value::Integer(i) => builder.append_value(*i as f64),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Binary => {
            let mut builder = BinaryBuilder::with_capacity(values.len(), 0);
            for value in values {
                match value {
                    Value::Blob(b) => builder.append_value(b),
                    Value::Text(s) => builder.append_value(s.as_bytes()),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::String => {
            let mut builder = StringBuilder::with_capacity(values.len(), 0);
            for value in values {
                match value {
                    Value::Text(s) => builder.append_value(s),
                    _ => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

fn real_as_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Text rendering used by the fallback path
pub fn render_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Text(s) => Some(s.clone()),
        Value::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
    }
}

/// Convert an Arrow column into SQLite values for insertion
///
/// Columns written by this crate are Int64, Float64, Binary or Utf8. Other
/// integer, boolean, float, large binary and large string columns are
/// normalized to those first so files from other writers still load.
pub fn array_to_values(array: &ArrayRef) -> Result<Vec<Value>> {
    let normalized: ArrayRef = match array.data_type() {
        DataType::Int64 | DataType::Float64 | DataType::Binary | DataType::Utf8 => array.clone(),
        DataType::Null => return Ok(vec![Value::Null; array.len()]),
        dt if dt.is_integer() || *dt == DataType::Boolean => cast(array, &DataType::Int64)?,
        dt if dt.is_floating() => cast(array, &DataType::Float64)?,
        DataType::LargeBinary => cast(array, &DataType::Binary)?,
        DataType::LargeUtf8 => cast(array, &DataType::Utf8)?,
        other => bail!("Unsupported Parquet column type {:?}", other),
    };

    let values = match normalized.data_type() {
        DataType::Int64 => {
            let a = downcast::<Int64Array>(&normalized)?;
            (0..a.len())
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::Integer(a.value(i))
                    }
                })
                .collect()
        }
        DataType::Float64 => {
            let a = downcast::<Float64Array>(&normalized)?;
            (0..a.len())
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::Real(a.value(i))
                    }
                })
                .collect()
        }
        DataType::Binary => {
            let a = downcast::<BinaryArray>(&normalized)?;
            (0..a.len())
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::Blob(a.value(i).to_vec())
                    }
                })
                .collect()
        }
        _ => {
            let a = downcast::<StringArray>(&normalized)?;
            (0..a.len())
                .map(|i| {
                    if a.is_null(i) {
                        Value::Null
                    } else {
                        Value::Text(a.value(i).to_string())
                    }
                })
                .collect()
        }
    };

    Ok(values)
}

fn downcast<T: 'static>(array: &ArrayRef) -> Result<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Unexpected Arrow array layout for {:?}", array.data_type()))
}

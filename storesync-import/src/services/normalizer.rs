//! Row normalization
//!
//! Turns mapped raw rows into [`CanonicalRecord`]s. A row is rejected only
//! when its store number cannot be read; bad metric values become null and
//! the row goes through.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;

use crate::models::{
    CanonicalField, CanonicalRecord, FieldKind, FieldMapping, FieldValue, RawRecord, BUSINESS_KEY,
};

/// Why a row was excluded from the import
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizeError {
    #[error("Row {row}: missing store number (N°)")]
    MissingKey { row: usize },

    #[error("Row {row}: invalid store number '{value}'")]
    InvalidKey { row: usize, value: String },

    #[error("Row {row}: duplicate store number {key}, row ignored")]
    DuplicateKey { row: usize, key: i64 },
}

/// Result of normalizing a whole upload
#[derive(Debug, Default)]
pub struct Normalized {
    pub records: Vec<CanonicalRecord>,
    pub errors: Vec<NormalizeError>,
}

/// Read a store number: base-10 integer, surrounding whitespace ignored
pub fn parse_business_key(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Read a metric cell
///
/// Text is trimmed, a decimal comma becomes a point and a trailing `%` is
/// dropped. Anything that still does not parse is null.
pub fn parse_numeric(value: &Value) -> FieldValue {
    match value {
        Value::Number(n) => n.as_f64().map(FieldValue::Decimal).unwrap_or(FieldValue::Null),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', ".");
            let cleaned = cleaned.strip_suffix('%').unwrap_or(cleaned.as_str()).trim_end();
            match cleaned.parse::<f64>() {
                Ok(v) if v.is_finite() => FieldValue::Decimal(v),
                _ => FieldValue::Null,
            }
        }
        _ => FieldValue::Null,
    }
}

/// Normalize one already-mapped row
///
/// `row` is the 1-based position used in error messages.
pub fn normalize_record(row: usize, raw: &RawRecord) -> Result<CanonicalRecord, NormalizeError> {
    let key_value = raw
        .get(BUSINESS_KEY)
        .filter(|v| !v.is_null())
        .ok_or(NormalizeError::MissingKey { row })?;

    let store_number =
        parse_business_key(key_value).ok_or_else(|| NormalizeError::InvalidKey {
            row,
            value: display_raw(key_value),
        })?;

    let mut record = CanonicalRecord::new(row, store_number);

    for (column, value) in raw {
        match CanonicalField::from_name(column) {
            Some(field) => match field.kind() {
                FieldKind::BusinessKey => {}
                FieldKind::Numeric => {
                    record.fields.insert(field, parse_numeric(value));
                }
                FieldKind::Text => {
                    record.fields.insert(field, FieldValue::from_json(value));
                }
            },
            None => {
                record
                    .extras
                    .insert(column.clone(), FieldValue::from_json(value));
            }
        }
    }

    Ok(record)
}

/// Map and normalize every row of an upload
///
/// Errors are collected per row; a bad row never stops the others. When a
/// store number appears more than once, the first row wins.
pub fn normalize_all(rows: &[RawRecord], mapping: &FieldMapping) -> Normalized {
    let mut out = Normalized::default();
    let mut seen = HashSet::new();

    for (index, raw) in rows.iter().enumerate() {
        let row = index + 1;
        let mapped = mapping.apply(raw);

        match normalize_record(row, &mapped) {
            Ok(record) => {
                if seen.insert(record.store_number) {
                    out.records.push(record);
                } else {
                    out.errors.push(NormalizeError::DuplicateKey {
                        row,
                        key: record.store_number,
                    });
                }
            }
            Err(e) => {
                tracing::debug!(row, error = %e, "Row rejected during normalization");
                out.errors.push(e);
            }
        }
    }

    out
}

fn display_raw(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

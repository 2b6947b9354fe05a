//! Record shapes flowing through the import pipeline
//!
//! Raw uploaded rows are renamed through a [`FieldMapping`], normalized into
//! [`CanonicalRecord`]s, and sent to the remote store as [`FieldMap`] payloads.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// One uploaded row: column name → raw cell value
pub type RawRecord = BTreeMap<String, serde_json::Value>;

/// Field name → value payload as written to the remote store
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    Decimal(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Convert a JSON value returned by the remote store or sent by a client
    ///
    /// Booleans, arrays and objects have no typed counterpart and are kept
    /// as their JSON text.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n
                    .as_f64()
                    .map(FieldValue::Decimal)
                    .unwrap_or_else(|| FieldValue::Text(n.to_string())),
            },
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            other => FieldValue::Text(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Numeric reading of the value, if it has one
    ///
    /// Text is accepted when it parses as a number after trimming, matching
    /// how loosely typed remote columns come back.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Decimal(d) => Some(*d),
            FieldValue::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            FieldValue::Null => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Decimal(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(i) => write!(f, "{}", i),
            FieldValue::Decimal(d) => write!(f, "{}", d),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Null => Ok(()),
        }
    }
}

/// How a canonical field is normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Store number; must parse as an integer or the row is rejected
    BusinessKey,
    /// Decimal metric; unparsable values become null
    Numeric,
    /// Passed through unchanged
    Text,
}

/// The fixed set of fields known to the per-store record shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CanonicalField {
    StoreNumber,
    ApprovedHours,
    GrowthPercent,
    AttentionLevel,
    StoreName,
    Zone,
    Manager,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::StoreNumber,
        CanonicalField::ApprovedHours,
        CanonicalField::GrowthPercent,
        CanonicalField::AttentionLevel,
        CanonicalField::StoreName,
        CanonicalField::Zone,
        CanonicalField::Manager,
    ];

    /// Column name in the remote table
    pub fn name(self) -> &'static str {
        match self {
            CanonicalField::StoreNumber => "N°",
            CanonicalField::ApprovedHours => "Horas Aprobadas Value",
            CanonicalField::GrowthPercent => "Crecimiento %",
            CanonicalField::AttentionLevel => "Nivel de Atención",
            CanonicalField::StoreName => "Tienda",
            CanonicalField::Zone => "Zona",
            CanonicalField::Manager => "Gerente",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            CanonicalField::StoreNumber => FieldKind::BusinessKey,
            CanonicalField::ApprovedHours
            | CanonicalField::GrowthPercent
            | CanonicalField::AttentionLevel => FieldKind::Numeric,
            CanonicalField::StoreName | CanonicalField::Zone | CanonicalField::Manager => {
                FieldKind::Text
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Business-key column name
pub const BUSINESS_KEY: &str = "N°";

/// Normalized, typed representation of one uploaded row
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRecord {
    /// 1-based position in the upload, for error messages
    pub row: usize,
    pub store_number: i64,
    /// Provided typed fields, business key excluded
    pub fields: BTreeMap<CanonicalField, FieldValue>,
    /// Columns outside the fixed shape, passed through untouched
    pub extras: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    pub fn new(row: usize, store_number: i64) -> Self {
        Self {
            row,
            store_number,
            fields: BTreeMap::new(),
            extras: BTreeMap::new(),
        }
    }

    /// Business key in the string form used by the existing-record index
    pub fn business_key(&self) -> String {
        self.store_number.to_string()
    }

    /// Every provided non-key field by remote column name
    pub fn provided_fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .map(|(field, value)| (field.name(), value))
            .chain(self.extras.iter().map(|(name, value)| (name.as_str(), value)))
    }

    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.fields.get(&field)
    }

    /// Full create payload, business key included
    pub fn to_payload(&self) -> FieldMap {
        let mut payload: FieldMap = self
            .provided_fields()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        payload.insert(
            BUSINESS_KEY.to_string(),
            FieldValue::Integer(self.store_number),
        );
        payload
    }
}

/// Upload column name → canonical field name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldMapping(pub HashMap<String, String>);

impl FieldMapping {
    /// A usable mapping sends at least one column to the business key
    pub fn maps_business_key(&self) -> bool {
        self.0.values().any(|target| target == BUSINESS_KEY)
    }

    /// Rename a row's columns
    ///
    /// Columns without a mapping entry keep their name. Mapped columns with
    /// an empty target are dropped.
    pub fn apply(&self, raw: &RawRecord) -> RawRecord {
        let mut mapped = RawRecord::new();
        for (column, value) in raw {
            match self.0.get(column) {
                Some(target) if target.is_empty() => {}
                Some(target) => {
                    mapped.insert(target.clone(), value.clone());
                }
                None => {
                    mapped.entry(column.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        mapped
    }
}

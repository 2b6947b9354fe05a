//! Data models for storesync-import
//!
//! - Record shapes: raw rows, field mapping, canonical records
//! - Import run results

pub mod import_result;
pub mod record;

pub use import_result::ImportSummary;
pub use record::{
    CanonicalField, CanonicalRecord, FieldKind, FieldMap, FieldMapping, FieldValue, RawRecord,
    BUSINESS_KEY,
};

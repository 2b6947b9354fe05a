//! Change detection against the existing remote records
//!
//! Each canonical record is classified as a create, an update carrying only
//! the changed fields, or unchanged. Unchanged records are counted as skipped
//! and never reach the remote store.

use std::collections::HashMap;

use crate::models::{CanonicalRecord, FieldMap, FieldValue, BUSINESS_KEY};
use crate::services::remote_store::{
    business_key_formula, RecordUpdate, RemoteError, RemoteRecord, RemoteStore,
};

/// Two numbers closer than this are the same value
pub const NUMERIC_TOLERANCE: f64 = 0.001;

/// Store numbers per index query, bounding the formula length
pub const INDEX_QUERY_CHUNK: usize = 50;

/// Existing remote records keyed by business key (string form)
#[derive(Debug, Default, Clone)]
pub struct ExistingRecordIndex {
    by_key: HashMap<String, RemoteRecord>,
}

impl ExistingRecordIndex {
    /// Index query results by their `N°` column
    ///
    /// Records without a readable store number cannot be matched and are
    /// left out. If the remote holds duplicates, the first one wins.
    pub fn from_records(records: Vec<RemoteRecord>) -> Self {
        let mut by_key = HashMap::with_capacity(records.len());
        for record in records {
            match record.fields.get(BUSINESS_KEY).and_then(key_string) {
                Some(key) => {
                    by_key.entry(key).or_insert(record);
                }
                None => {
                    tracing::warn!(
                        remote_id = %record.id,
                        "Remote record has no usable store number"
                    );
                }
            }
        }
        Self { by_key }
    }

    /// Query the remote for every incoming store number
    ///
    /// Called once per run. Keys are queried in chunks of
    /// [`INDEX_QUERY_CHUNK`]; any failed query fails the whole index.
    pub async fn fetch(store: &dyn RemoteStore, keys: &[i64]) -> Result<Self, RemoteError> {
        let mut records = Vec::new();
        for chunk in keys.chunks(INDEX_QUERY_CHUNK) {
            records.extend(store.query(&business_key_formula(chunk)).await?);
        }
        Ok(Self::from_records(records))
    }

    pub fn get(&self, business_key: &str) -> Option<&RemoteRecord> {
        self.by_key.get(business_key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

fn key_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Integer(i) => Some(i.to_string()),
        FieldValue::Decimal(d) if d.fract() == 0.0 => Some((*d as i64).to_string()),
        FieldValue::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Diff verdict for one record
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// No remote record with this business key
    Create(FieldMap),
    /// Remote record differs; `changes` holds only the differing fields
    Update { remote_id: String, changes: FieldMap },
    /// Every provided field matches the remote record
    Unchanged,
}

/// Whether a new value matches the stored one
///
/// Null on both sides (or a missing old value against a new null) is equal;
/// null against a value on either side is a change.
pub fn values_equal(new: &FieldValue, old: Option<&FieldValue>) -> bool {
    let old = match old {
        None | Some(FieldValue::Null) => return new.is_null(),
        Some(old) => old,
    };

    if new.is_null() {
        return false;
    }

    if new.is_numeric() || old.is_numeric() {
        if let (Some(a), Some(b)) = (new.as_f64(), old.as_f64()) {
            return (a - b).abs() <= NUMERIC_TOLERANCE;
        }
    }

    new.to_string() == old.to_string()
}

/// Classify one record against its existing snapshot
pub fn classify(record: &CanonicalRecord, existing: Option<&RemoteRecord>) -> Classification {
    let Some(existing) = existing else {
        return Classification::Create(record.to_payload());
    };

    let changes: FieldMap = record
        .provided_fields()
        .filter(|(name, value)| !values_equal(value, existing.fields.get(*name)))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();

    if changes.is_empty() {
        Classification::Unchanged
    } else {
        Classification::Update {
            remote_id: existing.id.clone(),
            changes,
        }
    }
}

/// Work to send to the remote store for one run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncPlan {
    /// Create payloads in upload order
    pub creates: Vec<FieldMap>,
    /// Changed-field updates in upload order
    pub updates: Vec<RecordUpdate>,
    pub skipped: usize,
}

impl SyncPlan {
    /// Records that will be sent or skipped
    pub fn total(&self) -> usize {
        self.creates.len() + self.updates.len() + self.skipped
    }
}

/// Classify every record of a run
pub fn plan(records: &[CanonicalRecord], index: &ExistingRecordIndex) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for record in records {
        match classify(record, index.get(&record.business_key())) {
            Classification::Create(payload) => plan.creates.push(payload),
            Classification::Update { remote_id, changes } => {
                tracing::debug!(
                    store_number = record.store_number,
                    changed = changes.len(),
                    "Record changed"
                );
                plan.updates.push(RecordUpdate {
                    id: remote_id,
                    fields: changes,
                });
            }
            Classification::Unchanged => plan.skipped += 1,
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalField;

    fn remote(id: &str, fields: &[(&str, FieldValue)]) -> RemoteRecord {
        RemoteRecord {
            id: id.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn record(store_number: i64, fields: &[(CanonicalField, FieldValue)]) -> CanonicalRecord {
        let mut record = CanonicalRecord::new(1, store_number);
        for (field, value) in fields {
            record.fields.insert(*field, value.clone());
        }
        record
    }

    #[test]
    fn test_numeric_tolerance() {
        let old = FieldValue::Integer(40);
        assert!(values_equal(&FieldValue::Decimal(40.0), Some(&old)));
        assert!(values_equal(&FieldValue::Decimal(40.0009), Some(&old)));
        assert!(!values_equal(&FieldValue::Decimal(40.002), Some(&old)));
        assert!(values_equal(
            &FieldValue::Decimal(40.5),
            Some(&FieldValue::Text("40.5".to_string()))
        ));
    }

    #[test]
    fn test_string_comparison() {
        let old = FieldValue::Text("Norte".to_string());
        assert!(values_equal(&FieldValue::Text("Norte".to_string()), Some(&old)));
        assert!(!values_equal(&FieldValue::Text("norte".to_string()), Some(&old)));
        assert!(values_equal(
            &FieldValue::Text("12".to_string()),
            Some(&FieldValue::Integer(12))
        ));
    }

    #[test]
    fn test_null_handling() {
        let value = FieldValue::Decimal(1.0);
        assert!(!values_equal(&FieldValue::Null, Some(&value)));
        assert!(!values_equal(&value, Some(&FieldValue::Null)));
        assert!(!values_equal(&value, None));
        assert!(values_equal(&FieldValue::Null, None));
        assert!(values_equal(&FieldValue::Null, Some(&FieldValue::Null)));
    }

    #[test]
    fn test_no_snapshot_creates() {
        let rec = record(12, &[(CanonicalField::ApprovedHours, FieldValue::Decimal(40.5))]);
        match classify(&rec, None) {
            Classification::Create(payload) => {
                assert_eq!(payload.get("N°"), Some(&FieldValue::Integer(12)));
                assert_eq!(
                    payload.get("Horas Aprobadas Value"),
                    Some(&FieldValue::Decimal(40.5))
                );
            }
            other => panic!("expected create, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_snapshot_is_unchanged() {
        let existing = remote(
            "rec1",
            &[
                ("N°", FieldValue::Integer(12)),
                ("Horas Aprobadas Value", FieldValue::Integer(40)),
                ("Zona", FieldValue::Text("Sur".to_string())),
            ],
        );
        let rec = record(12, &[(CanonicalField::ApprovedHours, FieldValue::Decimal(40.0))]);
        assert_eq!(classify(&rec, Some(&existing)), Classification::Unchanged);
    }

    #[test]
    fn test_update_carries_only_changed_fields() {
        let existing = remote(
            "rec1",
            &[
                ("N°", FieldValue::Integer(12)),
                ("Horas Aprobadas Value", FieldValue::Integer(40)),
                ("Zona", FieldValue::Text("Sur".to_string())),
            ],
        );
        let rec = record(
            12,
            &[
                (CanonicalField::ApprovedHours, FieldValue::Decimal(40.0)),
                (CanonicalField::Zone, FieldValue::Text("Norte".to_string())),
                (CanonicalField::Manager, FieldValue::Text("Ana".to_string())),
            ],
        );

        match classify(&rec, Some(&existing)) {
            Classification::Update { remote_id, changes } => {
                assert_eq!(remote_id, "rec1");
                assert_eq!(changes.len(), 2);
                assert_eq!(changes.get("Zona"), Some(&FieldValue::Text("Norte".to_string())));
                assert_eq!(changes.get("Gerente"), Some(&FieldValue::Text("Ana".to_string())));
                assert!(!changes.contains_key("N°"));
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_index_keys_and_plan() {
        let index = ExistingRecordIndex::from_records(vec![
            remote(
                "rec12",
                &[
                    ("N°", FieldValue::Integer(12)),
                    ("Horas Aprobadas Value", FieldValue::Decimal(40.0)),
                ],
            ),
            remote(
                "rec13",
                &[
                    ("N°", FieldValue::Text("13".to_string())),
                    ("Horas Aprobadas Value", FieldValue::Decimal(10.0)),
                ],
            ),
            remote("orphan", &[("Tienda", FieldValue::Text("x".to_string()))]),
        ]);
        assert_eq!(index.len(), 2);

        let records = vec![
            record(12, &[(CanonicalField::ApprovedHours, FieldValue::Decimal(40.0))]),
            record(13, &[(CanonicalField::ApprovedHours, FieldValue::Decimal(11.0))]),
            record(14, &[]),
        ];

        let plan = plan(&records, &index);
        assert_eq!(plan.skipped, 1);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].id, "rec13");
        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].get("N°"), Some(&FieldValue::Integer(14)));
        assert_eq!(plan.total(), 3);
    }
}

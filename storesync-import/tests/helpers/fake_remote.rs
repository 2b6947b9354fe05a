//! In-process remote table
//!
//! Behaves like the remote store closely enough for pipeline tests: formula
//! queries by store number, batched creates and updates with the batch
//! limit, and scripted failures per create call.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use storesync_import::models::{FieldMap, FieldValue, BUSINESS_KEY};
use storesync_import::services::remote_store::{
    check_batch_size, RecordUpdate, RemoteError, RemoteRecord, RemoteStore,
};

#[derive(Default)]
struct Inner {
    records: Vec<RemoteRecord>,
    next_id: usize,
    queries: Vec<String>,
    create_calls: Vec<usize>,
    update_calls: Vec<usize>,
}

/// Remote table held in memory
#[derive(Default)]
pub struct FakeRemoteStore {
    inner: Mutex<Inner>,
    /// 1-based create calls that fail with a 422
    failing_creates: HashSet<usize>,
    fail_queries: bool,
}

impl FakeRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-seeded with `records`, given ids `rec1`, `rec2`, …
    pub fn with_records(records: Vec<FieldMap>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock().unwrap();
            for fields in records {
                inner.next_id += 1;
                let id = format!("rec{}", inner.next_id);
                inner.records.push(RemoteRecord { id, fields });
            }
        }
        store
    }

    pub fn failing_create_calls(mut self, calls: &[usize]) -> Self {
        self.failing_creates = calls.iter().copied().collect();
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn record_by_key(&self, store_number: i64) -> Option<RemoteRecord> {
        self.records()
            .into_iter()
            .find(|r| r.fields.get(BUSINESS_KEY) == Some(&FieldValue::Integer(store_number)))
    }

    pub fn queries(&self) -> Vec<String> {
        self.inner.lock().unwrap().queries.clone()
    }

    pub fn create_calls(&self) -> Vec<usize> {
        self.inner.lock().unwrap().create_calls.clone()
    }

    pub fn update_calls(&self) -> Vec<usize> {
        self.inner.lock().unwrap().update_calls.clone()
    }
}

/// Store numbers named in an `OR({N°}=12,{N°}=13)` formula
fn formula_keys(formula: &str) -> Vec<String> {
    formula
        .trim_start_matches("OR(")
        .trim_end_matches(')')
        .split(',')
        .filter_map(|clause| clause.split_once('=').map(|(_, key)| key.trim().to_string()))
        .collect()
}

fn key_of(record: &RemoteRecord) -> Option<String> {
    match record.fields.get(BUSINESS_KEY)? {
        FieldValue::Null => None,
        value => Some(value.to_string()),
    }
}

#[async_trait]
impl RemoteStore for FakeRemoteStore {
    async fn query(&self, formula: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.queries.push(formula.to_string());
        if self.fail_queries {
            return Err(RemoteError::Api {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }

        let keys = formula_keys(formula);
        Ok(inner
            .records
            .iter()
            .filter(|r| key_of(r).is_some_and(|k| keys.contains(&k)))
            .cloned()
            .collect())
    }

    async fn create(&self, records: &[FieldMap]) -> Result<Vec<RemoteRecord>, RemoteError> {
        check_batch_size(records.len())?;
        let mut inner = self.inner.lock().unwrap();
        inner.create_calls.push(records.len());
        if self.failing_creates.contains(&inner.create_calls.len()) {
            return Err(RemoteError::Api {
                status: 422,
                body: "INVALID_MULTIPLE_CHOICE_OPTIONS".to_string(),
            });
        }

        let mut created = Vec::with_capacity(records.len());
        for fields in records {
            inner.next_id += 1;
            let record = RemoteRecord {
                id: format!("rec{}", inner.next_id),
                fields: fields.clone(),
            };
            inner.records.push(record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn update(&self, updates: &[RecordUpdate]) -> Result<Vec<RemoteRecord>, RemoteError> {
        check_batch_size(updates.len())?;
        let mut inner = self.inner.lock().unwrap();
        inner.update_calls.push(updates.len());

        let mut updated = Vec::with_capacity(updates.len());
        for update in updates {
            let record = inner
                .records
                .iter_mut()
                .find(|r| r.id == update.id)
                .ok_or_else(|| RemoteError::Api {
                    status: 404,
                    body: format!("Record {} not found", update.id),
                })?;
            for (name, value) in &update.fields {
                record.fields.insert(name.clone(), value.clone());
            }
            updated.push(record.clone());
        }
        Ok(updated)
    }
}

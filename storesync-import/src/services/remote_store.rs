//! Remote record store client
//!
//! The system of record is a table keyed by store number, reached through a
//! formula query, batched creates and batched updates. Batches above
//! [`MAX_BATCH_SIZE`] are refused by the remote; the HTTP client refuses them
//! locally with the same error instead of spending a request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::models::{FieldMap, FieldValue, BUSINESS_KEY};

/// Largest create/update batch the remote accepts
pub const MAX_BATCH_SIZE: usize = 10;

const USER_AGENT: &str = concat!("storesync/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Remote store errors
///
/// Display output is kept verbatim in session error lists.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Batch of {size} records exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),
}

/// A record as stored remotely
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRecord {
    /// Remote-internal id (not the store number)
    pub id: String,
    pub fields: FieldMap,
}

/// Changed fields for one existing record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: FieldMap,
}

/// Operations the import needs from the system of record
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All records matching a filter formula
    async fn query(&self, formula: &str) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Create up to [`MAX_BATCH_SIZE`] records
    async fn create(&self, records: &[FieldMap]) -> Result<Vec<RemoteRecord>, RemoteError>;

    /// Update up to [`MAX_BATCH_SIZE`] records by remote id
    async fn update(&self, updates: &[RecordUpdate]) -> Result<Vec<RemoteRecord>, RemoteError>;
}

/// Filter formula matching any of the given store numbers
///
/// `OR({N°}=12,{N°}=13)`
pub fn business_key_formula(keys: &[i64]) -> String {
    let clauses: Vec<String> = keys
        .iter()
        .map(|key| format!("{{{}}}={}", BUSINESS_KEY, key))
        .collect();
    format!("OR({})", clauses.join(","))
}

pub fn check_batch_size(size: usize) -> Result<(), RemoteError> {
    if size > MAX_BATCH_SIZE {
        return Err(RemoteError::BatchTooLarge {
            size,
            limit: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}

#[derive(Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
}

impl From<WireRecord> for RemoteRecord {
    fn from(wire: WireRecord) -> Self {
        Self {
            id: wire.id,
            fields: wire
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<WireRecord>,
    offset: Option<String>,
}

#[derive(Serialize)]
struct CreateItem<'a> {
    fields: &'a FieldMap,
}

#[derive(Serialize)]
struct RecordsBody<T: Serialize> {
    records: T,
}

/// HTTP client for an Airtable-style REST API
pub struct HttpRemoteStore {
    http_client: reqwest::Client,
    table_url: reqwest::Url,
    api_key: String,
}

impl HttpRemoteStore {
    pub fn new(
        base_url: &str,
        base_id: &str,
        table: &str,
        api_key: String,
    ) -> Result<Self, RemoteError> {
        let mut table_url = reqwest::Url::parse(base_url)
            .map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        table_url
            .path_segments_mut()
            .map_err(|_| RemoteError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .push(base_id)
            .push(table);

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            table_url,
            api_key,
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_page(response: reqwest::Response) -> Result<RecordPage, RemoteError> {
        response
            .json::<RecordPage>()
            .await
            .map_err(|e| RemoteError::Parse(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn query(&self, formula: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(self.table_url.clone())
                .query(&[("filterByFormula", formula)]);
            if let Some(offset) = &offset {
                request = request.query(&[("offset", offset.as_str())]);
            }

            tracing::debug!(url = %self.table_url, page = ?offset, "Querying remote store");
            let page = Self::parse_page(self.send(request).await?).await?;
            records.extend(page.records.into_iter().map(RemoteRecord::from));

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }

    async fn create(&self, records: &[FieldMap]) -> Result<Vec<RemoteRecord>, RemoteError> {
        check_batch_size(records.len())?;

        let body = RecordsBody {
            records: records
                .iter()
                .map(|fields| CreateItem { fields })
                .collect::<Vec<_>>(),
        };

        tracing::debug!(count = records.len(), "Creating remote records");
        let request = self.http_client.post(self.table_url.clone()).json(&body);
        let page = Self::parse_page(self.send(request).await?).await?;
        Ok(page.records.into_iter().map(RemoteRecord::from).collect())
    }

    async fn update(&self, updates: &[RecordUpdate]) -> Result<Vec<RemoteRecord>, RemoteError> {
        check_batch_size(updates.len())?;

        tracing::debug!(count = updates.len(), "Updating remote records");
        let request = self
            .http_client
            .patch(self.table_url.clone())
            .json(&RecordsBody { records: updates });
        let page = Self::parse_page(self.send(request).await?).await?;
        Ok(page.records.into_iter().map(RemoteRecord::from).collect())
    }
}

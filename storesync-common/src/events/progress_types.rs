//! Import progress type definitions
//!
//! Supporting types for storesync-import progress tracking. These are the
//! payloads streamed to SSE clients and returned by the status endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse stage of an import run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// No run has written to this session yet
    #[default]
    Waiting,
    /// Raw rows are being converted to canonical records
    Normalizing,
    /// Existing remote records are being fetched
    Indexing,
    /// Create batches are being dispatched
    Creating,
    /// Update batches are being dispatched
    Updating,
    /// Run finished (successfully or not)
    Completed,
}

/// Progress of one import session
///
/// Counts only grow within a session and `completed` flips to true once.
/// `total` stays zero until the completing write. `seq` and `last_updated`
/// are store bookkeeping and are ignored when comparing two snapshots for
/// equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub total: usize,
    pub current_batch: usize,
    pub total_batches: usize,
    /// Accumulated error messages, oldest first
    pub errors: Vec<String>,
    /// Human-readable status line
    pub message: String,
    pub phase: SyncPhase,
    pub completed: bool,
    /// Write counter of the session, bumped by every store write
    #[serde(default)]
    pub seq: u64,
    pub last_updated: DateTime<Utc>,
}

impl ProgressRecord {
    /// Zeroed record used before a session has any data
    pub fn waiting() -> Self {
        Self {
            message: "Waiting for import to start".to_string(),
            ..Self::default()
        }
    }
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            created: 0,
            updated: 0,
            skipped: 0,
            total: 0,
            current_batch: 0,
            total_batches: 0,
            errors: Vec::new(),
            message: String::new(),
            phase: SyncPhase::Waiting,
            completed: false,
            seq: 0,
            last_updated: Utc::now(),
        }
    }
}

impl PartialEq for ProgressRecord {
    fn eq(&self, other: &Self) -> bool {
        self.created == other.created
            && self.updated == other.updated
            && self.skipped == other.skipped
            && self.total == other.total
            && self.current_batch == other.current_batch
            && self.total_batches == other.total_batches
            && self.errors == other.errors
            && self.message == other.message
            && self.phase == other.phase
            && self.completed == other.completed
    }
}

impl Eq for ProgressRecord {}

/// Partial update merged into a [`ProgressRecord`]
///
/// Every `Some` field replaces the stored value. `errors` is the full
/// accumulated list, never a delta.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    pub created: Option<usize>,
    pub updated: Option<usize>,
    pub skipped: Option<usize>,
    pub total: Option<usize>,
    pub current_batch: Option<usize>,
    pub total_batches: Option<usize>,
    pub errors: Option<Vec<String>>,
    pub message: Option<String>,
    pub phase: Option<SyncPhase>,
    pub completed: Option<bool>,
}

impl ProgressUpdate {
    /// Shallow-merge into `record`
    ///
    /// Completion latches: once a record is completed, a later
    /// `completed: Some(false)` is ignored.
    pub fn apply_to(self, record: &mut ProgressRecord) {
        if let Some(v) = self.created {
            record.created = v;
        }
        if let Some(v) = self.updated {
            record.updated = v;
        }
        if let Some(v) = self.skipped {
            record.skipped = v;
        }
        if let Some(v) = self.total {
            record.total = v;
        }
        if let Some(v) = self.current_batch {
            record.current_batch = v;
        }
        if let Some(v) = self.total_batches {
            record.total_batches = v;
        }
        if let Some(v) = self.errors {
            record.errors = v;
        }
        if let Some(v) = self.message {
            record.message = v;
        }
        if let Some(v) = self.phase {
            record.phase = v;
        }
        if let Some(v) = self.completed {
            record.completed = record.completed || v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_ignores_bookkeeping() {
        let a = ProgressRecord::default();
        let mut b = a.clone();
        b.last_updated = a.last_updated + chrono::Duration::seconds(30);
        b.seq = 9;
        assert_eq!(a, b);

        b.created = 1;
        assert_ne!(a, b);
    }

    #[test]
    fn test_apply_merges_only_provided_fields() {
        let mut record = ProgressRecord {
            created: 3,
            message: "creating".to_string(),
            ..ProgressRecord::default()
        };

        ProgressUpdate {
            updated: Some(2),
            errors: Some(vec!["boom".to_string()]),
            ..ProgressUpdate::default()
        }
        .apply_to(&mut record);

        assert_eq!(record.created, 3);
        assert_eq!(record.updated, 2);
        assert_eq!(record.errors, vec!["boom".to_string()]);
        assert_eq!(record.message, "creating");
    }

    #[test]
    fn test_completion_latches() {
        let mut record = ProgressRecord::default();
        ProgressUpdate {
            completed: Some(true),
            ..ProgressUpdate::default()
        }
        .apply_to(&mut record);
        ProgressUpdate {
            completed: Some(false),
            ..ProgressUpdate::default()
        }
        .apply_to(&mut record);

        assert!(record.completed);
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(ProgressRecord::waiting()).unwrap();
        assert_eq!(json["currentBatch"], 0);
        assert_eq!(json["totalBatches"], 0);
        assert_eq!(json["completed"], false);
        assert_eq!(json["phase"], "waiting");
        assert!(json.get("lastUpdated").is_some());
    }
}

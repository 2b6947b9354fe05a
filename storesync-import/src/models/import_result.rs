//! Import run results

use serde::{Deserialize, Serialize};
use storesync_common::events::ProgressRecord;

/// Outcome of one import run, returned by `POST /api/import`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// False only when the run was aborted before dispatching
    pub success: bool,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Row, index and batch errors in the order they occurred
    pub errors: Vec<String>,
    pub total: usize,
    pub session_id: String,
}

impl ImportSummary {
    /// Summary mirroring a session's final progress record
    pub fn from_progress(session_id: &str, progress: &ProgressRecord, success: bool) -> Self {
        Self {
            success,
            created: progress.created,
            updated: progress.updated,
            skipped: progress.skipped,
            errors: progress.errors.clone(),
            total: progress.total,
            session_id: session_id.to_string(),
        }
    }
}

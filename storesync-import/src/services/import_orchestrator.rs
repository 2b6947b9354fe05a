//! Import run orchestration
//!
//! One run per session: map and normalize the uploaded rows, build the
//! existing-record index with a single pass of queries, diff, then hand the
//! plan to the [`BatchDispatcher`]. Progress is written at each step so
//! subscribers can follow the run.

use std::sync::Arc;

use storesync_common::events::{ProgressUpdate, SyncPhase};
use tracing::{debug, error, info, warn};

use crate::models::{FieldMapping, ImportSummary, RawRecord};
use crate::services::batch_dispatcher::{BatchDispatcher, DispatchSettings};
use crate::services::diff_engine::{self, ExistingRecordIndex};
use crate::services::normalizer;
use crate::services::progress_store::ProgressStore;
use crate::services::remote_store::RemoteStore;

/// Runs imports against one remote store
pub struct ImportOrchestrator {
    progress: Arc<dyn ProgressStore>,
    remote: Arc<dyn RemoteStore>,
    settings: DispatchSettings,
}

impl ImportOrchestrator {
    pub fn new(
        progress: Arc<dyn ProgressStore>,
        remote: Arc<dyn RemoteStore>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            progress,
            remote,
            settings,
        }
    }

    /// Execute a full import for `session_id`
    ///
    /// Row and batch failures are collected into the summary. `success` is
    /// false only when the run had to stop before dispatching.
    pub async fn run(
        &self,
        session_id: &str,
        rows: &[RawRecord],
        mapping: &FieldMapping,
    ) -> ImportSummary {
        info!(session_id = %session_id, rows = rows.len(), "Starting import");

        self.report(
            session_id,
            ProgressUpdate {
                phase: Some(SyncPhase::Normalizing),
                message: Some(format!("Normalizing {} rows", rows.len())),
                ..ProgressUpdate::default()
            },
        )
        .await;

        let normalized = normalizer::normalize_all(rows, mapping);
        let mut errors: Vec<String> =
            normalized.errors.iter().map(ToString::to_string).collect();
        if !errors.is_empty() {
            warn!(
                session_id = %session_id,
                rejected = errors.len(),
                "Rows rejected during normalization"
            );
        }

        self.report(
            session_id,
            ProgressUpdate {
                errors: Some(errors.clone()),
                phase: Some(SyncPhase::Indexing),
                message: Some(format!(
                    "Looking up {} existing records",
                    normalized.records.len()
                )),
                ..ProgressUpdate::default()
            },
        )
        .await;

        let keys: Vec<i64> = normalized.records.iter().map(|r| r.store_number).collect();
        let index = if keys.is_empty() {
            ExistingRecordIndex::default()
        } else {
            match ExistingRecordIndex::fetch(self.remote.as_ref(), &keys).await {
                Ok(index) => index,
                Err(e) => {
                    error!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to load existing records"
                    );
                    errors.push(format!("Failed to load existing records: {}", e));
                    return fail_session(self.progress.as_ref(), session_id, errors).await;
                }
            }
        };

        if index.is_empty() {
            debug!(session_id = %session_id, "No existing records matched, all rows are new");
        }
        let plan = diff_engine::plan(&normalized.records, &index);
        info!(
            session_id = %session_id,
            existing = index.len(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            skipped = plan.skipped,
            "Diff complete"
        );

        let dispatcher =
            BatchDispatcher::new(self.remote.clone(), self.progress.clone(), self.settings.clone());
        let outcome = dispatcher.run(session_id, plan, errors).await;

        ImportSummary {
            success: true,
            created: outcome.created,
            updated: outcome.updated,
            skipped: outcome.skipped,
            total: outcome.total(),
            errors: outcome.errors,
            session_id: session_id.to_string(),
        }
    }

    async fn report(&self, session_id: &str, update: ProgressUpdate) {
        if let Err(e) = self.progress.upsert(session_id, update).await {
            warn!(session_id = %session_id, error = %e, "Failed to write import progress");
        }
    }
}

/// Complete a session that cannot run, recording why
///
/// Subscribers see the errors and a completed record. Counts are left as
/// they are, which is zero for a run that never dispatched; the returned
/// summary has `success = false` and zero counts.
pub async fn fail_session(
    progress: &dyn ProgressStore,
    session_id: &str,
    errors: Vec<String>,
) -> ImportSummary {
    let message = errors
        .last()
        .cloned()
        .unwrap_or_else(|| "Import failed".to_string());

    let update = ProgressUpdate {
        errors: Some(errors.clone()),
        phase: Some(SyncPhase::Completed),
        message: Some(message),
        completed: Some(true),
        ..ProgressUpdate::default()
    };
    if let Err(e) = progress.upsert(session_id, update).await {
        warn!(session_id = %session_id, error = %e, "Failed to write import failure");
    }

    ImportSummary {
        success: false,
        created: 0,
        updated: 0,
        skipped: 0,
        total: 0,
        errors,
        session_id: session_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldMap;
    use crate::services::progress_store::InMemoryProgressStore;
    use crate::services::remote_store::{RecordUpdate, RemoteError, RemoteRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use storesync_common::events::EventBus;

    /// Remote whose queries always fail
    #[derive(Default)]
    struct UnreachableRemote {
        writes: AtomicUsize,
    }

    #[async_trait]
    impl RemoteStore for UnreachableRemote {
        async fn query(&self, _formula: &str) -> Result<Vec<RemoteRecord>, RemoteError> {
            Err(RemoteError::Network("connection refused".to_string()))
        }

        async fn create(&self, _records: &[FieldMap]) -> Result<Vec<RemoteRecord>, RemoteError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn update(
            &self,
            _updates: &[RecordUpdate],
        ) -> Result<Vec<RemoteRecord>, RemoteError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            batch_size: 10,
            pacing: Duration::ZERO,
            error_backoff: Duration::ZERO,
        }
    }

    fn rows(values: Vec<serde_json::Value>) -> Vec<RawRecord> {
        values
            .into_iter()
            .map(|v| serde_json::from_value(v).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_index_failure_completes_without_writes() {
        let remote = Arc::new(UnreachableRemote::default());
        let store = Arc::new(InMemoryProgressStore::new(EventBus::new(16)));
        let orchestrator = ImportOrchestrator::new(store.clone(), remote.clone(), settings());

        let summary = orchestrator
            .run(
                "s1",
                &rows(vec![json!({"N°": "12"}), json!({"N°": "bad"})]),
                &FieldMapping::default(),
            )
            .await;

        assert!(!summary.success);
        assert_eq!(summary.total, 0);
        assert_eq!(
            summary.errors,
            vec![
                "Row 2: invalid store number 'bad'".to_string(),
                "Failed to load existing records: Network error: connection refused".to_string(),
            ]
        );
        assert_eq!(remote.writes.load(Ordering::SeqCst), 0);

        let progress = store.read("s1").await.unwrap();
        assert!(progress.completed);
        assert_eq!(progress.phase, SyncPhase::Completed);
        assert_eq!(progress.errors, summary.errors);
    }

    #[tokio::test]
    async fn test_all_rows_rejected_skips_index_query() {
        let remote = Arc::new(UnreachableRemote::default());
        let store = Arc::new(InMemoryProgressStore::new(EventBus::new(16)));
        let orchestrator = ImportOrchestrator::new(store.clone(), remote, settings());

        let summary = orchestrator
            .run("s1", &rows(vec![json!({"N°": "bad"})]), &FieldMapping::default())
            .await;

        assert!(summary.success);
        assert_eq!(summary.created + summary.updated + summary.skipped, 0);
        assert_eq!(summary.errors.len(), 1);
        assert!(store.read("s1").await.unwrap().completed);
    }

    #[tokio::test]
    async fn test_fail_session_message() {
        let store = InMemoryProgressStore::new(EventBus::new(16));
        let errors = vec!["Remote store is not configured".to_string()];
        let summary = fail_session(&store, "s1", errors).await;

        assert!(!summary.success);
        let progress = store.read("s1").await.unwrap();
        assert!(progress.completed);
        assert_eq!(progress.message, "Remote store is not configured");
        assert_eq!(progress.created, 0);
    }
}

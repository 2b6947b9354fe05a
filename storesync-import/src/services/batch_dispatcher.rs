//! Batched, paced dispatch to the remote store
//!
//! Creates go first, then updates. Each phase is cut into batches of at most
//! [`MAX_BATCH_SIZE`] records, sent strictly one after another with a pause
//! between them and a longer pause after a failure. A failed batch is
//! recorded in the session's error list and the run moves on; nothing is
//! retried. Every batch, failed or not, produces a progress write, and the
//! run always ends with exactly one completing write.

use std::sync::Arc;
use std::time::Duration;

use storesync_common::config::SyncConfig;
use storesync_common::events::{ProgressUpdate, SyncPhase};
use tracing::{info, warn};

use crate::services::diff_engine::SyncPlan;
use crate::services::progress_store::ProgressStore;
use crate::services::remote_store::{RemoteError, RemoteStore, MAX_BATCH_SIZE};

/// Batch size and pacing for one dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub pacing: Duration,
    /// Pause after a failed batch
    pub error_backoff: Duration,
}

impl DispatchSettings {
    /// Settings from config, with the batch size clamped to `1..=MAX_BATCH_SIZE`
    pub fn from_config(config: &SyncConfig) -> Self {
        if config.batch_size > MAX_BATCH_SIZE {
            warn!(
                configured = config.batch_size,
                limit = MAX_BATCH_SIZE,
                "Batch size above remote limit, clamping"
            );
        }
        Self {
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            pacing: Duration::from_millis(config.pacing_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Number of batches needed for `items` records
pub fn batch_count(items: usize, batch_size: usize) -> usize {
    items.div_ceil(batch_size.max(1))
}

/// Counts reached by a finished dispatch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Every error of the run, including those passed in
    pub errors: Vec<String>,
    pub failed_batches: usize,
}

impl DispatchOutcome {
    pub fn total(&self) -> usize {
        self.created + self.updated + self.skipped
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Create,
    Update,
}

impl Phase {
    fn label(self) -> &'static str {
        match self {
            Phase::Create => "Create",
            Phase::Update => "Update",
        }
    }
}

/// Position of one batch within its phase and within the whole run
#[derive(Debug, Clone, Copy)]
struct BatchSlot {
    phase: Phase,
    /// 1-based index within the phase
    index: usize,
    phase_batches: usize,
    /// 1-based index across both phases
    run_index: usize,
    run_batches: usize,
}

impl BatchSlot {
    fn is_last(&self) -> bool {
        self.run_index >= self.run_batches
    }
}

/// Sends a [`SyncPlan`] to the remote store, writing progress as it goes
pub struct BatchDispatcher {
    remote: Arc<dyn RemoteStore>,
    progress: Arc<dyn ProgressStore>,
    settings: DispatchSettings,
}

impl BatchDispatcher {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        progress: Arc<dyn ProgressStore>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            remote,
            progress,
            settings,
        }
    }

    /// Execute the plan for `session_id`
    ///
    /// `errors` holds errors already accumulated by the run (rejected rows);
    /// batch failures are appended to it.
    pub async fn run(
        &self,
        session_id: &str,
        plan: SyncPlan,
        errors: Vec<String>,
    ) -> DispatchOutcome {
        let size = self.settings.batch_size;
        let create_batches = batch_count(plan.creates.len(), size);
        let update_batches = batch_count(plan.updates.len(), size);
        let total_batches = create_batches + update_batches;

        let mut outcome = DispatchOutcome {
            skipped: plan.skipped,
            errors,
            ..DispatchOutcome::default()
        };
        let mut batch_index = 0;

        info!(
            session_id = %session_id,
            records = plan.total(),
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            skipped = plan.skipped,
            total_batches,
            "Dispatching import"
        );

        self.report(
            session_id,
            ProgressUpdate {
                skipped: Some(plan.skipped),
                total_batches: Some(total_batches),
                current_batch: Some(0),
                phase: Some(SyncPhase::Creating),
                message: Some(format!(
                    "Sending {} new and {} changed records",
                    plan.creates.len(),
                    plan.updates.len()
                )),
                ..ProgressUpdate::default()
            },
        )
        .await;

        for (i, batch) in plan.creates.chunks(size).enumerate() {
            batch_index += 1;
            let slot = BatchSlot {
                phase: Phase::Create,
                index: i + 1,
                phase_batches: create_batches,
                run_index: batch_index,
                run_batches: total_batches,
            };
            let result = self.remote.create(batch).await.map(|_| ());
            let ok = self
                .record_batch(session_id, slot, batch.len(), result, &mut outcome)
                .await;
            self.pause(ok, slot).await;
        }

        if update_batches > 0 {
            self.report(
                session_id,
                ProgressUpdate {
                    phase: Some(SyncPhase::Updating),
                    ..ProgressUpdate::default()
                },
            )
            .await;
        }

        for (i, batch) in plan.updates.chunks(size).enumerate() {
            batch_index += 1;
            let slot = BatchSlot {
                phase: Phase::Update,
                index: i + 1,
                phase_batches: update_batches,
                run_index: batch_index,
                run_batches: total_batches,
            };
            let result = self.remote.update(batch).await.map(|_| ());
            let ok = self
                .record_batch(session_id, slot, batch.len(), result, &mut outcome)
                .await;
            self.pause(ok, slot).await;
        }

        self.report(
            session_id,
            ProgressUpdate {
                created: Some(outcome.created),
                updated: Some(outcome.updated),
                skipped: Some(outcome.skipped),
                total: Some(outcome.total()),
                current_batch: Some(batch_index),
                errors: Some(outcome.errors.clone()),
                phase: Some(SyncPhase::Completed),
                message: Some(completion_message(&outcome)),
                completed: Some(true),
                ..ProgressUpdate::default()
            },
        )
        .await;

        info!(
            session_id = %session_id,
            created = outcome.created,
            updated = outcome.updated,
            skipped = outcome.skipped,
            failed_batches = outcome.failed_batches,
            "Import dispatch complete"
        );

        outcome
    }

    /// Fold one batch result into the outcome and write progress
    ///
    /// Returns whether the batch succeeded.
    async fn record_batch(
        &self,
        session_id: &str,
        slot: BatchSlot,
        batch_len: usize,
        result: Result<(), RemoteError>,
        outcome: &mut DispatchOutcome,
    ) -> bool {
        let label = slot.phase.label();
        let ok = match result {
            Ok(()) => {
                match slot.phase {
                    Phase::Create => outcome.created += batch_len,
                    Phase::Update => outcome.updated += batch_len,
                }
                true
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    batch = slot.index,
                    of = slot.phase_batches,
                    phase = label,
                    error = %e,
                    "Batch failed, continuing with next batch"
                );
                outcome.failed_batches += 1;
                outcome.errors.push(format!(
                    "{} batch {}/{} failed: {}",
                    label, slot.index, slot.phase_batches, e
                ));
                false
            }
        };

        let mut update = ProgressUpdate {
            current_batch: Some(slot.run_index),
            message: Some(format!(
                "{} batch {} of {} {}",
                label,
                slot.index,
                slot.phase_batches,
                if ok { "done" } else { "failed" }
            )),
            ..ProgressUpdate::default()
        };
        match (ok, slot.phase) {
            (true, Phase::Create) => update.created = Some(outcome.created),
            (true, Phase::Update) => update.updated = Some(outcome.updated),
            (false, _) => update.errors = Some(outcome.errors.clone()),
        }
        self.report(session_id, update).await;

        ok
    }

    async fn pause(&self, last_ok: bool, slot: BatchSlot) {
        if slot.is_last() {
            return;
        }
        let delay = if last_ok {
            self.settings.pacing
        } else {
            self.settings.error_backoff
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn report(&self, session_id: &str, update: ProgressUpdate) {
        if let Err(e) = self.progress.upsert(session_id, update).await {
            warn!(session_id = %session_id, error = %e, "Failed to write import progress");
        }
    }
}

fn completion_message(outcome: &DispatchOutcome) -> String {
    let mut message = format!(
        "Import finished: {} created, {} updated, {} unchanged",
        outcome.created, outcome.updated, outcome.skipped
    );
    if !outcome.errors.is_empty() {
        message.push_str(&format!(", {} errors", outcome.errors.len()));
    }
    message
}

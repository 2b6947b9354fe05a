//! Session progress store
//!
//! Maps an import session id to its [`ProgressRecord`]. The import run for a
//! session is that session's only writer; SSE streams and the status endpoint
//! read. Every write is published on the [`EventBus`] so streams react to
//! mutations instead of polling.
//!
//! The default backend is a single-process in-memory map: progress does not
//! survive a restart and is not shared between instances. A shared cache can
//! stand in by implementing [`ProgressStore`].

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use storesync_common::events::{EventBus, ProgressRecord, ProgressUpdate, SyncEvent};
use storesync_common::Error;
use tokio::sync::RwLock;

/// GC view of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub session_id: String,
    pub completed: bool,
    pub last_mutated: DateTime<Utc>,
}

/// Key-value interface over session progress
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Merge `update` into the session's record, creating it with defaults
    /// if absent, and return the merged record
    async fn upsert(
        &self,
        session_id: &str,
        update: ProgressUpdate,
    ) -> storesync_common::Result<ProgressRecord>;

    /// Claim `session_id` for a new run and write its first record
    ///
    /// Fails with [`Error::SessionExists`] if the session is already held;
    /// the existing record is left untouched.
    async fn create(
        &self,
        session_id: &str,
        initial: ProgressUpdate,
    ) -> storesync_common::Result<ProgressRecord>;

    /// Current record, or `None` if the session is unknown
    async fn read(&self, session_id: &str) -> Option<ProgressRecord>;

    /// Every live session
    async fn sessions(&self) -> Vec<SessionInfo>;

    /// Evict a session, returning its last record
    async fn remove(&self, session_id: &str) -> Option<ProgressRecord>;
}

/// Process-local [`ProgressStore`]
pub struct InMemoryProgressStore {
    sessions: RwLock<HashMap<String, ProgressRecord>>,
    event_bus: EventBus,
}

impl InMemoryProgressStore {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            event_bus,
        }
    }

    /// Merge, stamp and publish; caller holds the write lock
    fn write(
        &self,
        session_id: &str,
        record: &mut ProgressRecord,
        update: ProgressUpdate,
    ) -> ProgressRecord {
        update.apply_to(record);
        record.seq += 1;
        record.last_updated = Utc::now();
        let merged = record.clone();

        // Published under the write lock so subscribers see writes in order
        self.event_bus.emit_lossy(SyncEvent::ProgressUpdated {
            session_id: session_id.to_string(),
            progress: merged.clone(),
        });

        merged
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn upsert(
        &self,
        session_id: &str,
        update: ProgressUpdate,
    ) -> storesync_common::Result<ProgressRecord> {
        let mut sessions = self.sessions.write().await;
        let record = sessions.entry(session_id.to_string()).or_default();
        Ok(self.write(session_id, record, update))
    }

    async fn create(
        &self,
        session_id: &str,
        initial: ProgressUpdate,
    ) -> storesync_common::Result<ProgressRecord> {
        let mut sessions = self.sessions.write().await;
        match sessions.entry(session_id.to_string()) {
            Entry::Occupied(_) => Err(Error::SessionExists(session_id.to_string())),
            Entry::Vacant(slot) => {
                let record = slot.insert(ProgressRecord::default());
                Ok(self.write(session_id, record, initial))
            }
        }
    }

    async fn read(&self, session_id: &str) -> Option<ProgressRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, record)| SessionInfo {
                session_id: id.clone(),
                completed: record.completed,
                last_mutated: record.last_updated,
            })
            .collect()
    }

    async fn remove(&self, session_id: &str) -> Option<ProgressRecord> {
        self.sessions.write().await.remove(session_id)
    }
}

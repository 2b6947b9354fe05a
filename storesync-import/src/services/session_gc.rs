//! Session garbage collection
//!
//! A periodic sweep evicts sessions that stopped changing. Completed sessions
//! and sessions still in progress have separate time-to-live values: the
//! former only need to outlive the client's final status poll, the latter
//! cover an import whose run died without completing.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use storesync_common::config::GcConfig;
use storesync_common::events::{EventBus, SyncEvent};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};

use crate::services::progress_store::{ProgressStore, SessionInfo};

/// Idle time after which a session is evicted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcPolicy {
    pub in_progress_ttl: Duration,
    pub completed_ttl: Duration,
}

impl GcPolicy {
    pub fn from_config(config: &GcConfig) -> Self {
        Self {
            in_progress_ttl: Duration::from_secs(config.in_progress_ttl_secs),
            completed_ttl: Duration::from_secs(config.completed_ttl_secs),
        }
    }

    /// Whether `session` has been idle longer than its TTL at `now`
    pub fn is_expired(&self, session: &SessionInfo, now: DateTime<Utc>) -> bool {
        let ttl = if session.completed {
            self.completed_ttl
        } else {
            self.in_progress_ttl
        };
        // Clock skew can make idle time negative; such sessions are fresh
        let idle = (now - session.last_mutated).to_std().unwrap_or(Duration::ZERO);
        idle > ttl
    }
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self::from_config(&GcConfig::default())
    }
}

/// One sweep over the store; returns the number of evicted sessions
pub async fn collect_garbage(
    store: &dyn ProgressStore,
    event_bus: &EventBus,
    policy: &GcPolicy,
    now: DateTime<Utc>,
) -> usize {
    let mut evicted = 0;

    for session in store.sessions().await {
        if !policy.is_expired(&session, now) {
            continue;
        }
        if store.remove(&session.session_id).await.is_some() {
            debug!(
                session_id = %session.session_id,
                completed = session.completed,
                last_mutated = %session.last_mutated,
                "Evicted import session"
            );
            let announced = event_bus.emit(SyncEvent::SessionEvicted {
                session_id: session.session_id,
                completed: session.completed,
                timestamp: now,
            });
            if let Ok(subscribers) = announced {
                debug!(subscribers, "Eviction announced to event subscribers");
            }
            evicted += 1;
        }
    }

    evicted
}

/// Background sweeper over a [`ProgressStore`]
pub struct SessionGc {
    store: Arc<dyn ProgressStore>,
    event_bus: EventBus,
    policy: GcPolicy,
    interval: Duration,
}

impl SessionGc {
    pub fn new(
        store: Arc<dyn ProgressStore>,
        event_bus: EventBus,
        policy: GcPolicy,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            event_bus,
            policy,
            interval,
        }
    }

    /// Spawn the sweep loop
    ///
    /// The task runs until aborted through the returned handle.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(
            "Starting session GC (interval: {}s, in-progress TTL: {}s, completed TTL: {}s)",
            self.interval.as_secs(),
            self.policy.in_progress_ttl.as_secs(),
            self.policy.completed_ttl.as_secs()
        );

        tokio::spawn(async move {
            let mut timer = interval(self.interval.max(Duration::from_millis(1)));
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                let evicted =
                    collect_garbage(self.store.as_ref(), &self.event_bus, &self.policy, Utc::now())
                        .await;
                if evicted > 0 {
                    info!("Session GC evicted {} session(s)", evicted);
                }
            }
        })
    }
}

//! services/client/src/sync.rs
//!
//! The background sync scheduler: flushes the conversation transcript and
//! session metadata to the backend on a fixed cadence, plus immediately
//! when the host reports the tab regained visibility. Both flushes are
//! no-ops when nothing changed since the last successful sync, so
//! redundant invocations are cheap.
//!
//! Failures here degrade silently: they are logged and retried on the
//! next cycle, never surfaced as errors.

use crate::store::SessionStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SyncScheduler {
    store: Arc<SessionStore>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    /// Spawns the periodic sync task. The first flush happens one full
    /// interval after startup.
    pub fn spawn(store: Arc<SessionStore>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task_store = store.clone();

        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval's first tick completes immediately; consume it so the
            // cadence starts one interval out.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = tick.tick() => run_sync(&task_store).await,
                }
            }
            debug!("Sync scheduler stopped.");
        });

        Self {
            store,
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// The host regained visibility; flush immediately rather than waiting
    /// for the next cycle.
    pub async fn on_visibility_regained(&self) {
        run_sync(&self.store).await;
    }

    /// Stops the background task. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_sync(store: &SessionStore) {
    if let Err(e) = store.sync_conversation_with_backend().await {
        warn!(error = %e, "Conversation sync failed; will retry next cycle.");
    }
    if let Err(e) = store.sync_metadata_with_backend().await {
        warn!(error = %e, "Metadata sync failed; will retry next cycle.");
    }
}

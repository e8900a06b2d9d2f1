//! services/client/src/runtime.rs
//!
//! `TutorClient` bundles the engagement core into one explicitly
//! constructed context object: built when a user session begins, torn down
//! when it ends, and handed to consumers instead of living as ambient
//! global state.

use crate::adapters::backend::HttpBackend;
use crate::bus::{BroadcastBus, Subscription, Topic};
use crate::config::Config;
use crate::error::ClientError;
use crate::telemetry;
use crate::engagement::EngagementTracker;
use crate::lessons::LessonPlanLoader;
use crate::sequencer::{ActivityEvent, ActivitySequencer};
use crate::store::SessionStore;
use crate::sync::SyncScheduler;
use java_tutor_core::domain::{LessonPlan, Session};
use java_tutor_core::ports::{LocalStore, PortResult, TutorBackendService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub struct TutorClient {
    config: Arc<Config>,
    bus: BroadcastBus,
    store: Arc<SessionStore>,
    sequencer: Arc<ActivitySequencer>,
    tracker: Arc<EngagementTracker>,
    lessons: Arc<LessonPlanLoader>,
    sync: SyncScheduler,
    // Held so progress broadcasts keep refreshing the lesson list for the
    // lifetime of the client.
    _progress_subscription: Subscription,
}

impl TutorClient {
    /// Wires the full engagement runtime around the given backend and
    /// local store.
    pub fn new(
        config: Config,
        user_id: &str,
        backend: Arc<dyn TutorBackendService>,
        local: Arc<dyn LocalStore>,
    ) -> Self {
        let config = Arc::new(config);
        let bus = BroadcastBus::new();
        let store = Arc::new(SessionStore::new(
            user_id,
            backend.clone(),
            local.clone(),
            bus.clone(),
        ));
        let sequencer = Arc::new(ActivitySequencer::new(
            config.thresholds(),
            backend.clone(),
            store.clone(),
            local,
            config.practice_reprompt_guard,
        ));
        let tracker = Arc::new(EngagementTracker::new(sequencer.clone()));
        let lessons = Arc::new(LessonPlanLoader::new(
            backend,
            config.topic_debounce,
            config.progress_reload_throttle,
        ));
        let sync = SyncScheduler::spawn(store.clone(), config.sync_interval);

        // Cross-tab progress updates are advisory refresh signals: reload
        // the lesson list, throttled, and never let a failure escape the
        // bus handler.
        let reload_target = lessons.clone();
        let progress_subscription = bus.subscribe(Topic::ProgressUpdated, move |_| {
            let lessons = reload_target.clone();
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = lessons.reload_on_progress().await {
                            warn!(error = %e, "Progress-triggered lesson reload failed.");
                        }
                    });
                }
                Err(_) => debug!("No async runtime; progress-triggered reload skipped."),
            }
        });

        Self {
            config,
            bus,
            store,
            sequencer,
            tracker,
            lessons,
            sync,
            _progress_subscription: progress_subscription,
        }
    }

    /// Boots a client from environment configuration: installs tracing and
    /// connects the REST adapter. The embedding host supplies the local
    /// store (file-backed, in-memory, or its own).
    pub fn from_env(user_id: &str, local: Arc<dyn LocalStore>) -> Result<Self, ClientError> {
        let config = Config::from_env()?;
        telemetry::init(config.log_level);
        Ok(Self::connect(config, user_id, local))
    }

    /// Convenience constructor using the REST adapter against the
    /// configured backend URL.
    pub fn connect(config: Config, user_id: &str, local: Arc<dyn LocalStore>) -> Self {
        let backend = Arc::new(HttpBackend::new(
            config.backend_base_url.clone(),
            config.auth_token.clone(),
        ));
        Self::new(config, user_id, backend, local)
    }

    /// Restores any active server-side session and begins engagement
    /// tracking. Returns the restored session, if one existed.
    pub async fn start(&self) -> Option<Session> {
        let session = self
            .store
            .initialize(self.config.auth_token.as_deref())
            .await;
        self.tracker.start().await;
        session
    }

    /// A topic change: engagement state resets and the lesson list reloads
    /// (debounced; a superseded switch yields `Ok(None)`).
    pub async fn switch_topic(&self, topic_id: &str) -> PortResult<Option<Vec<LessonPlan>>> {
        self.tracker.reset().await;
        self.lessons.switch_topic(topic_id).await
    }

    /// Subscribes to the sequencer's transition events.
    pub fn activity_events(&self) -> mpsc::UnboundedReceiver<ActivityEvent> {
        self.sequencer.events()
    }

    /// The host reports the tab regained visibility: flush pending state.
    pub async fn on_visibility_regained(&self) {
        self.sync.on_visibility_regained().await;
    }

    /// Tears the runtime down: background sync stops, tracking stops, and
    /// gate state clears so nothing stale fires on the next session.
    pub async fn shutdown(&self) {
        self.sync.shutdown();
        self.tracker.stop();
        self.sequencer.reset().await;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &BroadcastBus {
        &self.bus
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<EngagementTracker> {
        &self.tracker
    }

    pub fn lessons(&self) -> &Arc<LessonPlanLoader> {
        &self.lessons
    }
}

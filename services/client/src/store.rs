//! services/client/src/store.rs
//!
//! The session store: the single source of truth, per running client, for
//! "what session am I in", with server reconciliation on startup and
//! opportunistic local persistence in between.
//!
//! The store is the only writer of the local-storage keys it manages:
//!   preserved_session_{user_id}, conversation_history_{user_id},
//!   session_metadata_{user_id} (all JSON).

use crate::bus::{BroadcastBus, Topic};
use crate::token;
use java_tutor_core::domain::{Message, Session, SessionMetadata};
use java_tutor_core::ports::{LocalStore, PortError, PortResult, TutorBackendService};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

//=========================================================================================
// SessionStore
//=========================================================================================

pub struct SessionStore {
    backend: Arc<dyn TutorBackendService>,
    local: Arc<dyn LocalStore>,
    bus: BroadcastBus,
    user_id: String,
    current: RwLock<Option<Session>>,
    selected_lesson: Mutex<Option<String>>,
    conversation_synced: AtomicBool,
    metadata_synced: AtomicBool,
}

impl SessionStore {
    pub fn new(
        user_id: impl Into<String>,
        backend: Arc<dyn TutorBackendService>,
        local: Arc<dyn LocalStore>,
        bus: BroadcastBus,
    ) -> Self {
        Self {
            backend,
            local,
            bus,
            user_id: user_id.into(),
            current: RwLock::new(None),
            selected_lesson: Mutex::new(None),
            conversation_synced: AtomicBool::new(true),
            metadata_synced: AtomicBool::new(true),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    fn session_key(&self) -> String {
        format!("preserved_session_{}", self.user_id)
    }

    fn conversation_key(&self) -> String {
        format!("conversation_history_{}", self.user_id)
    }

    fn metadata_key(&self) -> String {
        format!("session_metadata_{}", self.user_id)
    }

    //=====================================================================================
    // Session lifecycle
    //=====================================================================================

    /// Queries the server for an active session and, if found, merges its
    /// metadata with any locally cached metadata (local wins on key
    /// collisions), persists the result, and broadcasts session-activated.
    ///
    /// Never fails the caller: network errors are logged and treated as
    /// "no session". The store does not speculatively create sessions;
    /// creation is deferred to the moment the user starts a lesson
    /// (see [`SessionStore::adopt_session`]).
    pub async fn initialize(&self, auth_token: Option<&str>) -> Option<Session> {
        let mut session = match self.backend.fetch_active_session(&self.user_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!(user_id = %self.user_id, "No active session found server-side.");
                return None;
            }
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "Session fetch failed; treating as no session.");
                return None;
            }
        };

        // Ownership check: the backend remains the authority, so a mismatch
        // between the token's user id and the session's recorded owner is
        // logged and tolerated (id formats differ between auth providers).
        if let Some(token) = auth_token {
            if let Some(token_user) = token::user_id_from_token(token) {
                if token_user != session.user_id {
                    warn!(
                        token_user = %token_user,
                        session_user = %session.user_id,
                        "Session owner does not match the authenticated user; proceeding."
                    );
                }
            }
        }

        // Local metadata takes precedence over the server copy.
        let local_metadata = self.load_session_metadata();
        session.metadata.merge(&local_metadata);

        self.persist_session(&session);
        *self.current.write().await = Some(session.clone());
        self.bus.publish(
            Topic::SessionActivated,
            &serde_json::json!({ "session_id": session.id, "user_id": session.user_id }),
        );
        info!(session_id = %session.id, "Session restored from server.");
        Some(session)
    }

    /// Installs a freshly created session as current. This is the deferred
    /// creation moment: the chat flow creates the session server-side when
    /// the user actually starts a lesson, then hands the record here.
    pub async fn adopt_session(&self, mut session: Session) {
        session.active = true;
        session.touch();
        self.persist_session(&session);
        *self.current.write().await = Some(session.clone());
        self.conversation_synced.store(true, Ordering::SeqCst);
        self.metadata_synced.store(true, Ordering::SeqCst);
        self.bus.publish(
            Topic::SessionActivated,
            &serde_json::json!({ "session_id": session.id, "user_id": session.user_id }),
        );
    }

    /// Asks the server to mark a known session active again and replaces the
    /// current session with the result. Failures propagate to the caller:
    /// this is a user-initiated action and must be visible.
    pub async fn reactivate(&self, session_id: &str) -> PortResult<Session> {
        let session = self.backend.reactivate_session(session_id).await?;
        self.persist_session(&session);
        *self.current.write().await = Some(session.clone());
        self.bus.publish(
            Topic::SessionActivated,
            &serde_json::json!({ "session_id": session.id, "user_id": session.user_id }),
        );
        Ok(session)
    }

    /// Deactivates server-side and clears local state. Local cleanup happens
    /// even when the server call fails (a stale "active" session must never
    /// linger here), but the error is still surfaced to the caller.
    pub async fn deactivate(&self, session_id: &str) -> PortResult<()> {
        let result = self.backend.deactivate_session(session_id).await;

        *self.current.write().await = None;
        if let Err(e) = self.local.remove(&self.session_key()) {
            warn!(error = %e, "Failed to clear preserved session from local storage.");
        }
        self.bus.publish(
            Topic::SessionDeactivated,
            &serde_json::json!({ "session_id": session_id, "user_id": self.user_id }),
        );

        if let Err(e) = &result {
            warn!(session_id, error = %e, "Server-side deactivation failed; local state cleared anyway.");
        }
        result
    }

    /// A read reference to the current session, if any.
    pub async fn current_session(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    //=====================================================================================
    // Conversation transcript
    //=====================================================================================

    /// Reads the transcript from the per-user local slot. A missing or
    /// unparsable slot yields an empty transcript with a logged warning.
    pub fn load_conversation_history(&self) -> Vec<Message> {
        match self.local.get(&self.conversation_key()) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(error = %e, "Stored conversation is malformed; starting empty.");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read conversation slot; starting empty.");
                Vec::new()
            }
        }
    }

    /// Writes the transcript locally, broadcasts conversation-updated, and
    /// marks the backend copy stale.
    pub fn save_conversation_history(&self, messages: &[Message]) -> PortResult<()> {
        let raw = serde_json::to_string(messages)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.local.set(&self.conversation_key(), &raw)?;
        self.conversation_synced.store(false, Ordering::SeqCst);
        self.bus.publish(
            Topic::ConversationUpdated,
            &serde_json::json!({ "user_id": self.user_id, "messages": messages.len() }),
        );
        Ok(())
    }

    /// Pushes the local transcript to the server unless nothing changed
    /// since the last successful sync. Message ids and timestamps are
    /// already in their canonical textual forms through serialization.
    /// Safe to call redundantly and on a timer.
    pub async fn sync_conversation_with_backend(&self) -> PortResult<()> {
        if self.conversation_synced.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session) = self.current_session().await else {
            debug!("No current session; conversation sync skipped.");
            return Ok(());
        };
        let Some(session_id) = session.numeric_id() else {
            return Ok(());
        };

        let messages = self.load_conversation_history();
        self.backend.push_conversation(session_id, &messages).await?;
        self.conversation_synced.store(true, Ordering::SeqCst);
        debug!(session_id, count = messages.len(), "Conversation synced with backend.");
        Ok(())
    }

    //=====================================================================================
    // Session metadata
    //=====================================================================================

    /// Reads the merged metadata record from the per-user local slot.
    pub fn load_session_metadata(&self) -> SessionMetadata {
        match self.local.get(&self.metadata_key()) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(error = %e, "Stored metadata is malformed; starting empty.");
                    SessionMetadata::new()
                }
            },
            Ok(None) => SessionMetadata::new(),
            Err(e) => {
                warn!(error = %e, "Failed to read metadata slot; starting empty.");
                SessionMetadata::new()
            }
        }
    }

    /// Shallow-merges `partial` into the stored metadata (merge, never
    /// wholesale replace), mirrors the merge into the current session, and
    /// marks the backend copy stale.
    pub async fn save_session_metadata(&self, partial: &SessionMetadata) -> PortResult<()> {
        let mut merged = self.load_session_metadata();
        merged.merge(partial);

        let raw = serde_json::to_string(&merged)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        self.local.set(&self.metadata_key(), &raw)?;

        if let Some(session) = self.current.write().await.as_mut() {
            session.metadata.merge(partial);
            session.touch();
        }

        self.metadata_synced.store(false, Ordering::SeqCst);
        self.bus.publish(
            Topic::MetadataUpdated,
            &serde_json::json!({ "user_id": self.user_id, "keys": partial.0.keys().collect::<Vec<_>>() }),
        );
        Ok(())
    }

    /// Mirrors [`SessionStore::sync_conversation_with_backend`] for metadata.
    pub async fn sync_metadata_with_backend(&self) -> PortResult<()> {
        if self.metadata_synced.load(Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session) = self.current_session().await else {
            debug!("No current session; metadata sync skipped.");
            return Ok(());
        };
        let Some(session_id) = session.numeric_id() else {
            return Ok(());
        };

        let metadata = self.load_session_metadata();
        self.backend.push_metadata(session_id, &metadata).await?;
        self.metadata_synced.store(true, Ordering::SeqCst);
        debug!(session_id, "Metadata synced with backend.");
        Ok(())
    }

    //=====================================================================================
    // Lesson resolution
    //=====================================================================================

    /// Records the lesson the user explicitly selected in the UI, the
    /// highest-priority source for activity resolution.
    pub fn set_selected_lesson(&self, lesson_id: Option<String>) {
        *self.selected_lesson.lock().unwrap() = lesson_id;
    }

    /// Resolves the lesson activities should attach to, falling through:
    /// explicitly selected lesson → current session's lesson → the lesson id
    /// persisted in metadata.
    pub async fn resolve_lesson_id(&self) -> Option<String> {
        if let Some(selected) = self.selected_lesson.lock().unwrap().clone() {
            return Some(selected);
        }
        if let Some(session) = self.current.read().await.as_ref() {
            if let Some(lesson_id) = &session.lesson_id {
                return Some(lesson_id.clone());
            }
        }
        self.load_session_metadata()
            .get_str("lesson_id")
            .map(str::to_owned)
    }

    //=====================================================================================
    // Internals
    //=====================================================================================

    fn persist_session(&self, session: &Session) {
        match serde_json::to_string(session) {
            Ok(raw) => {
                if let Err(e) = self.local.set(&self.session_key(), &raw) {
                    warn!(error = %e, "Failed to persist session locally.");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize session for local persistence."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStore;
    use crate::testutil::{sample_session, ScriptedBackend};
    use chrono::{TimeZone, Utc};
    use java_tutor_core::domain::MessageSender;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn store_with(backend: Arc<ScriptedBackend>) -> (SessionStore, Arc<MemoryStore>, BroadcastBus) {
        let local = Arc::new(MemoryStore::new());
        let bus = BroadcastBus::new();
        let store = SessionStore::new("u-1", backend, local.clone(), bus.clone());
        (store, local, bus)
    }

    #[tokio::test]
    async fn metadata_save_merges_instead_of_replacing() {
        let backend = Arc::new(ScriptedBackend::new());
        let (store, _local, _bus) = store_with(backend);

        let mut first = SessionMetadata::new();
        first.insert("a", serde_json::json!(1));
        store.save_session_metadata(&first).await.unwrap();

        let mut second = SessionMetadata::new();
        second.insert("b", serde_json::json!(2));
        store.save_session_metadata(&second).await.unwrap();

        let stored = store.load_session_metadata();
        assert_eq!(stored.get("a"), Some(&serde_json::json!(1)));
        assert_eq!(stored.get("b"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn conversation_round_trips_with_coerced_ids() {
        let backend = Arc::new(ScriptedBackend::new());
        let (store, _local, _bus) = store_with(backend);

        // A numeric id as older backend payloads produce it.
        let user_msg: Message = serde_json::from_value(serde_json::json!({
            "id": 17,
            "sender": "user",
            "text": "How do I reverse an ArrayList?",
            "timestamp": "2026-02-01T09:30:00Z"
        }))
        .unwrap();
        let tutor_msg = Message {
            id: "m-2".into(),
            sender: MessageSender::TutorA,
            text: "Use Collections.reverse:".into(),
            code_snippet: Some("Collections.reverse(list);".into()),
            timestamp: Utc.with_ymd_and_hms(2026, 2, 1, 9, 30, 5).unwrap(),
        };
        let messages = vec![user_msg, tutor_msg];

        store.save_conversation_history(&messages).unwrap();
        let loaded = store.load_conversation_history();

        assert_eq!(loaded, messages);
        assert_eq!(loaded[0].id, "17");
        assert_eq!(loaded[1].code_snippet.as_deref(), Some("Collections.reverse(list);"));
    }

    #[tokio::test]
    async fn initialize_merges_metadata_local_wins() {
        let mut session = sample_session();
        session
            .metadata
            .insert("theme", serde_json::json!("server-dark"));
        session.metadata.insert("c", serde_json::json!(3));
        let backend = Arc::new(ScriptedBackend::with_active_session(session));
        let (store, local, bus) = store_with(backend);

        // Pre-seed the local metadata slot as a previous run would have.
        local
            .set(
                "session_metadata_u-1",
                r#"{"theme":"local-light","b":2}"#,
            )
            .unwrap();

        let activations = Arc::new(AtomicUsize::new(0));
        let observed = activations.clone();
        let _sub = bus.subscribe(Topic::SessionActivated, move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        let restored = store.initialize(None).await.expect("session restored");

        assert_eq!(restored.metadata.get_str("theme"), Some("local-light"));
        assert_eq!(restored.metadata.get("b"), Some(&serde_json::json!(2)));
        assert_eq!(restored.metadata.get("c"), Some(&serde_json::json!(3)));
        assert_eq!(activations.load(Ordering::SeqCst), 1);
        assert!(local.get("preserved_session_u-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn initialize_swallows_network_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_fetch.store(true, Ordering::SeqCst);
        let (store, _local, _bus) = store_with(backend);

        assert!(store.initialize(None).await.is_none());
        assert!(store.current_session().await.is_none());
    }

    #[tokio::test]
    async fn deactivate_clears_local_state_even_on_server_failure() {
        let backend = Arc::new(ScriptedBackend::with_active_session(sample_session()));
        backend.fail_deactivate.store(true, Ordering::SeqCst);
        let (store, local, bus) = store_with(backend);
        store.initialize(None).await.unwrap();

        let deactivations = Arc::new(AtomicUsize::new(0));
        let observed = deactivations.clone();
        let _sub = bus.subscribe(Topic::SessionDeactivated, move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        let result = store.deactivate("1001").await;

        assert!(result.is_err());
        assert!(store.current_session().await.is_none());
        assert!(local.get("preserved_session_u-1").unwrap().is_none());
        assert_eq!(deactivations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn conversation_sync_is_debounced_by_synced_flag() {
        let backend = Arc::new(ScriptedBackend::with_active_session(sample_session()));
        let (store, _local, _bus) = store_with(backend.clone());
        store.initialize(None).await.unwrap();

        // Nothing written yet: sync is a no-op.
        store.sync_conversation_with_backend().await.unwrap();
        assert_eq!(backend.push_conversation_calls.load(Ordering::SeqCst), 0);

        store.save_conversation_history(&[]).unwrap();
        store.sync_conversation_with_backend().await.unwrap();
        store.sync_conversation_with_backend().await.unwrap();
        assert_eq!(backend.push_conversation_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn metadata_sync_is_debounced_by_synced_flag() {
        let backend = Arc::new(ScriptedBackend::with_active_session(sample_session()));
        let (store, _local, _bus) = store_with(backend.clone());
        store.initialize(None).await.unwrap();

        let mut meta = SessionMetadata::new();
        meta.insert("theme", serde_json::json!("dark"));
        store.save_session_metadata(&meta).await.unwrap();

        store.sync_metadata_with_backend().await.unwrap();
        store.sync_metadata_with_backend().await.unwrap();
        assert_eq!(backend.push_metadata_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lesson_resolution_falls_through_chain() {
        let backend = Arc::new(ScriptedBackend::new());
        let (store, _local, _bus) = store_with(backend);

        // Nothing anywhere: unresolvable.
        assert_eq!(store.resolve_lesson_id().await, None);

        // Metadata is the last resort.
        let mut meta = SessionMetadata::new();
        meta.insert("lesson_id", serde_json::json!("lesson-from-meta"));
        store.save_session_metadata(&meta).await.unwrap();
        assert_eq!(
            store.resolve_lesson_id().await.as_deref(),
            Some("lesson-from-meta")
        );

        // The session's lesson outranks metadata.
        store.adopt_session(sample_session()).await;
        assert_eq!(
            store.resolve_lesson_id().await.as_deref(),
            Some("lesson-arraylist")
        );

        // An explicit selection outranks everything.
        store.set_selected_lesson(Some("lesson-selected".into()));
        assert_eq!(
            store.resolve_lesson_id().await.as_deref(),
            Some("lesson-selected")
        );
    }
}

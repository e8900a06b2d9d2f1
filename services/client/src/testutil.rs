//! services/client/src/testutil.rs
//!
//! Shared test doubles: a scriptable `TutorBackendService` whose responses
//! and failure modes are set per test, with call counters for asserting
//! how often the client actually hit the network.

use async_trait::async_trait;
use chrono::Utc;
use java_tutor_core::domain::{
    LessonPlan, Message, PracticeRef, QuizRef, QuizStatus, Session, SessionMetadata,
    TutorPreference,
};
use java_tutor_core::ports::{PortError, PortResult, TutorBackendService};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// A backend double with scriptable responses and per-endpoint counters.
#[derive(Default)]
pub struct ScriptedBackend {
    pub active_session: Mutex<Option<Session>>,
    pub fail_fetch: AtomicBool,
    pub fail_deactivate: AtomicBool,
    pub fail_next_quiz: AtomicBool,
    pub fail_log_preference: AtomicBool,

    pub push_conversation_calls: AtomicUsize,
    pub push_metadata_calls: AtomicUsize,
    pub quiz_status_calls: AtomicUsize,
    pub next_quiz_calls: AtomicUsize,
    pub next_practice_calls: AtomicUsize,
    pub lesson_plan_calls: AtomicUsize,

    pub quiz_statuses: Mutex<Vec<QuizStatus>>,
    pub quiz: Mutex<Option<QuizRef>>,
    pub practice: Mutex<Option<PracticeRef>>,
    pub preferences: Mutex<Vec<(i64, TutorPreference)>>,
    pub progress_percent: Mutex<u8>,
    pub plans_by_topic: Mutex<HashMap<String, Vec<LessonPlan>>>,
    /// Topics whose lesson-plan fetch blocks until the Notify fires, for
    /// exercising in-flight supersession.
    pub plan_gates: Mutex<HashMap<String, std::sync::Arc<Notify>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_active_session(session: Session) -> Self {
        let backend = Self::default();
        *backend.active_session.lock().unwrap() = Some(session);
        backend
    }
}

#[async_trait]
impl TutorBackendService for ScriptedBackend {
    async fn fetch_active_session(&self, _user_id: &str) -> PortResult<Option<Session>> {
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("connection refused".into()));
        }
        Ok(self.active_session.lock().unwrap().clone())
    }

    async fn reactivate_session(&self, session_id: &str) -> PortResult<Session> {
        let mut guard = self.active_session.lock().unwrap();
        match guard.as_mut() {
            Some(session) if session.id == session_id => {
                session.active = true;
                Ok(session.clone())
            }
            _ => Err(PortError::NotFound(format!("session {session_id}"))),
        }
    }

    async fn deactivate_session(&self, _session_id: &str) -> PortResult<()> {
        if self.fail_deactivate.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("gateway timeout".into()));
        }
        if let Some(session) = self.active_session.lock().unwrap().as_mut() {
            session.active = false;
        }
        Ok(())
    }

    async fn push_conversation(&self, _session_id: i64, _messages: &[Message]) -> PortResult<()> {
        self.push_conversation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn push_metadata(&self, _session_id: i64, _metadata: &SessionMetadata) -> PortResult<()> {
        self.push_metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn lesson_quiz_statuses(&self, _lesson_id: &str) -> PortResult<Vec<QuizStatus>> {
        self.quiz_status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.quiz_statuses.lock().unwrap().clone())
    }

    async fn next_quiz(&self, _lesson_id: &str) -> PortResult<Option<QuizRef>> {
        self.next_quiz_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_quiz.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("quiz service unavailable".into()));
        }
        Ok(self.quiz.lock().unwrap().clone())
    }

    async fn next_practice(&self, _lesson_id: &str) -> PortResult<Option<PracticeRef>> {
        self.next_practice_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.practice.lock().unwrap().clone())
    }

    async fn log_preference(&self, session_id: i64, choice: TutorPreference) -> PortResult<()> {
        if self.fail_log_preference.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("preference endpoint down".into()));
        }
        self.preferences.lock().unwrap().push((session_id, choice));
        Ok(())
    }

    async fn lesson_progress(&self, _user_id: &str, _lesson_id: &str) -> PortResult<u8> {
        Ok(*self.progress_percent.lock().unwrap())
    }

    async fn lesson_plans(&self, topic_id: &str) -> PortResult<Vec<LessonPlan>> {
        self.lesson_plan_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.plan_gates.lock().unwrap().get(topic_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self
            .plans_by_topic
            .lock()
            .unwrap()
            .get(topic_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// A numeric-id session for user "u-1", the shape most tests want.
pub fn sample_session() -> Session {
    Session {
        id: "1001".into(),
        user_id: "u-1".into(),
        topic_id: Some("topic-java-collections".into()),
        lesson_id: Some("lesson-arraylist".into()),
        metadata: SessionMetadata::new(),
        active: true,
        last_activity_at: Utc::now(),
    }
}

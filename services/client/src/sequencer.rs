//! services/client/src/sequencer.rs
//!
//! The threshold gate / activity sequencer: a per-lesson-cycle state
//! machine driven by the engagement score that decides when to surface a
//! quiz, then a practice exercise, then the tutor-preference poll, then
//! the lesson-completion prompt.
//!
//! Stages advance Idle → QuizPending → QuizActive → PracticePending →
//! PracticeActive → PollPending → Completed; `reset` starts a new cycle.
//! Stages are strictly sequential: the practice gate never fires before
//! quiz completion, even when the score has long passed its threshold.
//!
//! Transition outputs are named events consumed via explicit subscription,
//! not injected callbacks.

use crate::store::SessionStore;
use chrono::{DateTime, Utc};
use java_tutor_core::domain::{
    PracticeRef, QuizRef, Stage, ThresholdConfig, TriggeredActivity, TutorPreference,
};
use java_tutor_core::ports::{LocalStore, TutorBackendService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

//=========================================================================================
// Events
//=========================================================================================

/// A transition output of the sequencer.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    /// Present this quiz now.
    QuizTriggered { lesson_id: String, quiz: QuizRef },
    /// Present this practice exercise now.
    PracticeTriggered {
        lesson_id: String,
        practice: PracticeRef,
    },
    /// Ask the user which tutor variant they preferred.
    PollRequested,
    /// The backend reports the lesson fully complete; congratulate the user.
    LessonCompleted { lesson_id: String },
    /// A transient, user-facing notice about a failed automatic action.
    Notice { message: String },
}

//=========================================================================================
// State
//=========================================================================================

#[derive(Debug)]
struct SequencerState {
    stage: Stage,
    triggered: TriggeredActivity,
    quiz_reached: bool,
    practice_reached: bool,
    quiz_completed: bool,
    /// Set when the quiz gate found the lesson already fully passed, so the
    /// gate stays quiet instead of nagging a finished user.
    completion_acknowledged: bool,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            stage: Stage::Idle,
            triggered: TriggeredActivity::None,
            quiz_reached: false,
            practice_reached: false,
            quiz_completed: false,
            completion_acknowledged: false,
        }
    }
}

impl SequencerState {
    /// Returns the quiz gate to its armed position after a failed firing,
    /// so a later scoring cycle can retry.
    fn rearm_quiz(&mut self) {
        self.stage = Stage::Idle;
        self.triggered = TriggeredActivity::None;
        self.quiz_reached = false;
    }

    /// Same for the practice gate; the quiz stays completed.
    fn rearm_practice(&mut self) {
        self.stage = Stage::QuizActive;
        self.triggered = TriggeredActivity::None;
        self.practice_reached = false;
    }
}

//=========================================================================================
// ActivitySequencer
//=========================================================================================

pub struct ActivitySequencer {
    config: ThresholdConfig,
    backend: Arc<dyn TutorBackendService>,
    store: Arc<SessionStore>,
    local: Arc<dyn LocalStore>,
    /// Window during which a just-finished practice is not prompted again.
    practice_guard: Duration,
    state: Mutex<SequencerState>,
    listeners: StdMutex<Vec<mpsc::UnboundedSender<ActivityEvent>>>,
    /// Memoized per-lesson answer to "are all of this lesson's quizzes
    /// already passed?", invalidated on quiz completion and reset.
    passed_cache: Mutex<HashMap<String, bool>>,
}

impl ActivitySequencer {
    pub fn new(
        config: ThresholdConfig,
        backend: Arc<dyn TutorBackendService>,
        store: Arc<SessionStore>,
        local: Arc<dyn LocalStore>,
        practice_guard: Duration,
    ) -> Self {
        Self {
            config,
            backend,
            store,
            local,
            practice_guard,
            state: Mutex::new(SequencerState::default()),
            listeners: StdMutex::new(Vec::new()),
            passed_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribes to transition events. Every subscriber sees every event.
    pub fn events(&self) -> mpsc::UnboundedReceiver<ActivityEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().unwrap().push(tx);
        rx
    }

    fn emit(&self, event: ActivityEvent) {
        debug!(?event, "Sequencer event.");
        self.listeners
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Current stage, trigger tag, and reached flags for diagnostics.
    pub async fn snapshot(&self) -> (Stage, TriggeredActivity, bool, bool) {
        let st = self.state.lock().await;
        (st.stage, st.triggered, st.quiz_reached, st.practice_reached)
    }

    //=====================================================================================
    // Inputs
    //=====================================================================================

    /// Evaluates the gates against a new score. Called on every scoring
    /// event; the triggered-activity tag guarantees at most one transition
    /// per threshold crossing, however bursty the events.
    pub async fn on_score(&self, score: u32) {
        let mut st = self.state.lock().await;
        if score >= self.config.quiz_threshold {
            st.quiz_reached = true;
        }
        if score >= self.config.practice_threshold {
            st.practice_reached = true;
        }
        if !self.config.auto_trigger {
            return;
        }

        match st.stage {
            Stage::Idle
                if st.quiz_reached
                    && st.triggered == TriggeredActivity::None
                    && !st.completion_acknowledged =>
            {
                st.stage = Stage::QuizPending;
                st.triggered = TriggeredActivity::Quiz;
                self.fire_quiz(&mut st).await;
            }
            // The practice condition was satisfied before the quiz was
            // submitted; it fires now that both hold.
            Stage::QuizActive
                if st.quiz_completed
                    && st.practice_reached
                    && st.triggered == TriggeredActivity::None =>
            {
                st.stage = Stage::PracticePending;
                st.triggered = TriggeredActivity::Practice;
                self.fire_practice(&mut st).await;
            }
            _ => {}
        }
    }

    /// The surrounding UI reports the quiz as submitted.
    pub async fn on_quiz_completed(&self, score: u32) {
        // Pass state changed; drop the memoized answer.
        self.passed_cache.lock().await.clear();

        let mut st = self.state.lock().await;
        st.quiz_completed = true;
        if score >= self.config.practice_threshold {
            st.practice_reached = true;
        }

        match st.stage {
            Stage::QuizPending | Stage::QuizActive => {
                st.triggered = TriggeredActivity::None;
                if st.practice_reached && self.config.auto_trigger {
                    st.stage = Stage::PracticePending;
                    st.triggered = TriggeredActivity::Practice;
                    self.fire_practice(&mut st).await;
                } else {
                    // Quiz submitted; the practice gate waits for its score.
                    st.stage = Stage::QuizActive;
                }
            }
            _ => debug!(stage = ?st.stage, "Quiz completion recorded outside a quiz stage."),
        }
    }

    /// The surrounding UI reports the practice exercise as finished.
    pub async fn on_practice_completed(&self) {
        if let Err(e) = self
            .local
            .set(&self.practice_guard_key(), &Utc::now().to_rfc3339())
        {
            warn!(error = %e, "Failed to record the practice-completion guard.");
        }

        let mut st = self.state.lock().await;
        match st.stage {
            Stage::PracticePending | Stage::PracticeActive => {
                st.stage = Stage::PollPending;
                st.triggered = TriggeredActivity::None;
                self.emit(ActivityEvent::PollRequested);
            }
            _ => debug!(stage = ?st.stage, "Practice completion recorded outside a practice stage."),
        }
    }

    /// The poll was answered (`Some`) or explicitly skipped (`None`). The
    /// completion prompt is decoupled from the poll by a server-truth check:
    /// it only fires when backend-reported lesson progress is at 100%.
    pub async fn resolve_poll(&self, choice: Option<TutorPreference>) {
        let mut st = self.state.lock().await;
        if st.stage != Stage::PollPending {
            debug!(stage = ?st.stage, "Poll resolution outside the poll stage; ignored.");
            return;
        }

        if let Some(choice) = choice {
            match self
                .store
                .current_session()
                .await
                .and_then(|s| s.numeric_id())
            {
                Some(session_id) => {
                    if let Err(e) = self.backend.log_preference(session_id, choice).await {
                        error!(error = %e, "Failed to log tutor preference.");
                        self.emit(ActivityEvent::Notice {
                            message: "Failed to record your choice".into(),
                        });
                    }
                }
                None => warn!("No numeric session id; tutor preference not recorded."),
            }
        }

        if let Some(lesson_id) = self.store.resolve_lesson_id().await {
            match self
                .backend
                .lesson_progress(self.store.user_id(), &lesson_id)
                .await
            {
                Ok(percent) if percent >= 100 => {
                    info!(%lesson_id, "Lesson complete per backend progress.");
                    self.emit(ActivityEvent::LessonCompleted { lesson_id });
                }
                Ok(percent) => debug!(%lesson_id, percent, "Lesson not yet complete."),
                Err(e) => {
                    warn!(%lesson_id, error = %e, "Progress lookup failed; completion prompt skipped.")
                }
            }
        }

        st.stage = Stage::Completed;
        st.triggered = TriggeredActivity::None;
    }

    /// Starts a new lesson cycle: topic change, session teardown, or the
    /// end of a poll/completion round.
    pub async fn reset(&self) {
        *self.state.lock().await = SequencerState::default();
        self.passed_cache.lock().await.clear();
        debug!("Sequencer reset to idle.");
    }

    /// Clears a trigger left hanging by an interrupted cycle: a quiz or
    /// practice that was presented but never completed before tracking
    /// stopped re-arms, so the gate can fire again once the score crosses
    /// its threshold after resumption. Score-side state is untouched.
    pub async fn clear_transient(&self) {
        let mut st = self.state.lock().await;
        match (st.stage, st.triggered) {
            (Stage::QuizPending | Stage::QuizActive, TriggeredActivity::Quiz) => {
                st.rearm_quiz();
            }
            (Stage::PracticePending | Stage::PracticeActive, TriggeredActivity::Practice) => {
                st.rearm_practice();
            }
            _ => {}
        }
    }

    //=====================================================================================
    // Gate firings (called with the state lock held)
    //=====================================================================================

    async fn fire_quiz(&self, st: &mut SequencerState) {
        let Some(lesson_id) = self.store.resolve_lesson_id().await else {
            warn!("No lesson resolvable for the quiz trigger.");
            self.emit(ActivityEvent::Notice {
                message: "Pick a lesson to unlock your quiz.".into(),
            });
            st.rearm_quiz();
            return;
        };

        if self.lesson_fully_passed(&lesson_id).await {
            debug!(%lesson_id, "All quizzes already passed; quiz gate acknowledged silently.");
            st.stage = Stage::Idle;
            st.triggered = TriggeredActivity::None;
            st.completion_acknowledged = true;
            return;
        }

        match self.backend.next_quiz(&lesson_id).await {
            Ok(Some(quiz)) => {
                info!(%lesson_id, quiz_id = %quiz.id, "Quiz gate fired.");
                st.stage = Stage::QuizActive;
                self.emit(ActivityEvent::QuizTriggered { lesson_id, quiz });
            }
            Ok(None) => {
                debug!(%lesson_id, "No quiz available to present.");
                st.rearm_quiz();
            }
            Err(e) => {
                error!(%lesson_id, error = %e, "Quiz resolution failed.");
                self.emit(ActivityEvent::Notice {
                    message: "Failed to start quiz".into(),
                });
                st.rearm_quiz();
            }
        }
    }

    async fn fire_practice(&self, st: &mut SequencerState) {
        let Some(lesson_id) = self.store.resolve_lesson_id().await else {
            warn!("No lesson resolvable for the practice trigger.");
            self.emit(ActivityEvent::Notice {
                message: "Pick a lesson to unlock practice.".into(),
            });
            st.rearm_practice();
            return;
        };

        if self.recently_completed_practice() {
            // The user just finished practice in this browser; treat the
            // stage as already satisfied and move on to the poll.
            debug!(%lesson_id, "Practice finished recently; advancing to the poll.");
            st.stage = Stage::PollPending;
            st.triggered = TriggeredActivity::None;
            self.emit(ActivityEvent::PollRequested);
            return;
        }

        match self.backend.next_practice(&lesson_id).await {
            Ok(Some(practice)) => {
                info!(%lesson_id, practice_id = %practice.id, "Practice gate fired.");
                st.stage = Stage::PracticeActive;
                self.emit(ActivityEvent::PracticeTriggered { lesson_id, practice });
            }
            Ok(None) => {
                debug!(%lesson_id, "No practice exercise available.");
                st.rearm_practice();
            }
            Err(e) => {
                error!(%lesson_id, error = %e, "Practice resolution failed.");
                self.emit(ActivityEvent::Notice {
                    message: "Failed to load practice exercise".into(),
                });
                st.rearm_practice();
            }
        }
    }

    //=====================================================================================
    // Queries
    //=====================================================================================

    /// Memoized "is every quiz across the lesson's modules already passed".
    /// Lookup failures are treated as "not passed" and left uncached.
    async fn lesson_fully_passed(&self, lesson_id: &str) -> bool {
        let mut cache = self.passed_cache.lock().await;
        if let Some(&passed) = cache.get(lesson_id) {
            return passed;
        }
        match self.backend.lesson_quiz_statuses(lesson_id).await {
            Ok(statuses) => {
                let passed = !statuses.is_empty() && statuses.iter().all(|s| s.passed);
                cache.insert(lesson_id.to_string(), passed);
                passed
            }
            Err(e) => {
                warn!(%lesson_id, error = %e, "Quiz pass-state lookup failed; assuming not passed.");
                false
            }
        }
    }

    fn practice_guard_key(&self) -> String {
        format!("recent_practice_{}", self.store.user_id())
    }

    fn recently_completed_practice(&self) -> bool {
        let raw = match self.local.get(&self.practice_guard_key()) {
            Ok(Some(raw)) => raw,
            Ok(None) => return false,
            Err(e) => {
                warn!(error = %e, "Practice-guard read failed; ignoring the guard.");
                return false;
            }
        };
        match raw.parse::<DateTime<Utc>>() {
            Ok(finished_at) => {
                let elapsed = Utc::now().signed_duration_since(finished_at);
                elapsed
                    .to_std()
                    .map(|elapsed| elapsed < self.practice_guard)
                    .unwrap_or(false)
            }
            Err(e) => {
                debug!(error = %e, "Practice-guard timestamp is malformed; ignoring it.");
                false
            }
        }
    }
}

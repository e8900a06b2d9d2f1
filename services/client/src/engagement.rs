//! services/client/src/engagement.rs
//!
//! The engagement accumulator: converts discrete interaction events into a
//! single per-session score and feeds every change to the activity
//! sequencer. The score is monotonically non-decreasing while tracking is
//! active; only an explicit reset (topic change, session teardown) zeroes it.
//!
//! Callers are expected to filter trivial events (very short chat messages,
//! idle scrolling) before recording; the accumulator prices events, it does
//! not police them.

use crate::sequencer::ActivitySequencer;
use java_tutor_core::domain::EngagementSnapshot;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Points per substantial chat message.
pub const MESSAGE_POINTS: u32 = 3;
/// Points per successful code execution, the strongest engagement signal.
pub const CODE_EXECUTION_POINTS: u32 = 5;
/// Points per substantial scroll event.
pub const SCROLL_POINTS: u32 = 1;
/// Points per other meaningful interaction.
pub const GENERIC_INTERACTION_POINTS: u32 = 1;

#[derive(Debug, Default)]
struct TrackerState {
    score: u32,
    tracking: bool,
}

pub struct EngagementTracker {
    sequencer: Arc<ActivitySequencer>,
    state: Mutex<TrackerState>,
}

impl EngagementTracker {
    pub fn new(sequencer: Arc<ActivitySequencer>) -> Self {
        Self {
            sequencer,
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Begins tracking. Transient trigger state is cleared so nothing stale
    /// fires after resumption; the score is left alone, zeroing it is the
    /// separate, explicit [`EngagementTracker::reset`].
    pub async fn start(&self) {
        self.state.lock().unwrap().tracking = true;
        self.sequencer.clear_transient().await;
        debug!("Engagement tracking started.");
    }

    pub fn stop(&self) {
        self.state.lock().unwrap().tracking = false;
        debug!("Engagement tracking stopped.");
    }

    pub async fn record_message(&self) {
        self.apply(MESSAGE_POINTS).await;
    }

    pub async fn record_code_execution(&self) {
        self.apply(CODE_EXECUTION_POINTS).await;
    }

    pub async fn record_scroll(&self) {
        self.apply(SCROLL_POINTS).await;
    }

    pub async fn record_generic_interaction(&self) {
        self.apply(GENERIC_INTERACTION_POINTS).await;
    }

    /// The surrounding UI reports the quiz as submitted; the sequencer may
    /// advance to the practice stage.
    pub async fn record_quiz_completion(&self) {
        let score = self.state.lock().unwrap().score;
        self.sequencer.on_quiz_completed(score).await;
    }

    /// The surrounding UI reports the practice exercise as finished.
    pub async fn record_practice_completion(&self) {
        self.sequencer.on_practice_completed().await;
    }

    /// Zeroes the score and clears all gate state: topic change, session
    /// teardown, or the end of a poll/completion cycle.
    pub async fn reset(&self) {
        self.state.lock().unwrap().score = 0;
        self.sequencer.reset().await;
        debug!("Engagement state reset.");
    }

    /// Read-only diagnostics snapshot; no side effects.
    pub async fn get_analytics(&self) -> EngagementSnapshot {
        let score = self.state.lock().unwrap().score;
        let (stage, triggered, quiz_reached, practice_reached) = self.sequencer.snapshot().await;
        EngagementSnapshot {
            score,
            quiz_threshold_reached: quiz_reached,
            practice_threshold_reached: practice_reached,
            triggered_activity: triggered,
            stage,
        }
    }

    /// Applies points and re-evaluates the gates. Events recorded while
    /// tracking is stopped are ignored.
    async fn apply(&self, points: u32) {
        let score = {
            let mut st = self.state.lock().unwrap();
            if !st.tracking {
                return;
            }
            st.score += points;
            st.score
        };
        self.sequencer.on_score(score).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryStore;
    use crate::bus::BroadcastBus;
    use crate::sequencer::ActivityEvent;
    use crate::store::SessionStore;
    use crate::testutil::{sample_session, ScriptedBackend};
    use java_tutor_core::domain::{
        QuizRef, QuizStatus, Stage, ThresholdConfig, TriggeredActivity,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    async fn tracker_with_backend() -> (EngagementTracker, Arc<ActivitySequencer>) {
        let backend = Arc::new(ScriptedBackend::new());
        *backend.quiz_statuses.lock().unwrap() =
            vec![QuizStatus { id: "q1".into(), passed: false }];
        *backend.quiz.lock().unwrap() = Some(QuizRef {
            id: "q1".into(),
            module_id: "m1".into(),
            title: "Interfaces".into(),
        });
        let local = Arc::new(MemoryStore::new());
        let store = Arc::new(SessionStore::new(
            "u-1",
            backend.clone(),
            local.clone(),
            BroadcastBus::new(),
        ));
        store.adopt_session(sample_session()).await;
        let sequencer = Arc::new(ActivitySequencer::new(
            ThresholdConfig::default(),
            backend,
            store,
            local,
            Duration::from_secs(6 * 3600),
        ));
        (EngagementTracker::new(sequencer.clone()), sequencer)
    }

    fn drain(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<ActivityEvent>,
    ) -> Vec<ActivityEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn chat_and_code_burst_triggers_quiz_exactly_once() {
        let (tracker, sequencer) = tracker_with_backend().await;
        let mut rx = sequencer.events();
        tracker.start().await;

        // Five substantial chat messages, then five successful runs.
        for _ in 0..5 {
            tracker.record_message().await;
        }
        for _ in 0..5 {
            tracker.record_code_execution().await;
        }

        let analytics = tracker.get_analytics().await;
        assert_eq!(analytics.score, 40);
        assert!(analytics.quiz_threshold_reached);
        assert!(!analytics.practice_threshold_reached);
        assert_eq!(analytics.triggered_activity, TriggeredActivity::Quiz);
        assert_eq!(analytics.stage, Stage::QuizActive);

        let events = drain(&mut rx);
        let quiz_count = events
            .iter()
            .filter(|e| matches!(e, ActivityEvent::QuizTriggered { .. }))
            .count();
        assert_eq!(quiz_count, 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, ActivityEvent::PracticeTriggered { .. })));
    }

    #[tokio::test]
    async fn reset_clears_score_flags_and_rearms() {
        let (tracker, sequencer) = tracker_with_backend().await;
        let mut rx = sequencer.events();
        tracker.start().await;

        for _ in 0..8 {
            tracker.record_code_execution().await;
        }
        assert_eq!(tracker.get_analytics().await.score, 40);

        tracker.reset().await;
        let analytics = tracker.get_analytics().await;
        assert_eq!(analytics.score, 0);
        assert!(!analytics.quiz_threshold_reached);
        assert!(!analytics.practice_threshold_reached);
        assert_eq!(analytics.triggered_activity, TriggeredActivity::None);
        assert_eq!(analytics.stage, Stage::Idle);

        // A fresh burst re-triggers the quiz gate from scratch.
        drain(&mut rx);
        for _ in 0..7 {
            tracker.record_code_execution().await;
        }
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, ActivityEvent::QuizTriggered { .. })));
    }

    #[tokio::test]
    async fn events_before_start_and_after_stop_are_ignored() {
        let (tracker, _sequencer) = tracker_with_backend().await;

        tracker.record_message().await;
        assert_eq!(tracker.get_analytics().await.score, 0);

        tracker.start().await;
        tracker.record_scroll().await;
        tracker.record_generic_interaction().await;
        assert_eq!(tracker.get_analytics().await.score, 2);

        tracker.stop();
        tracker.record_code_execution().await;
        // Stopping does not erase the score, it only pauses accumulation.
        assert_eq!(tracker.get_analytics().await.score, 2);
    }
}

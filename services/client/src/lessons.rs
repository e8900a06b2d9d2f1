//! services/client/src/lessons.rs
//!
//! Lesson-plan loading with supersession guards. Topic switches debounce
//! briefly, cancel any in-flight fetch, and carry a monotonically
//! increasing request ticket so a stale response can never overwrite the
//! list a newer request produced. Progress-broadcast reloads are throttled;
//! both the debounce and the throttle exist to reduce network pressure,
//! while the ticket is what correctness rests on.

use java_tutor_core::domain::LessonPlan;
use java_tutor_core::ports::{PortResult, TutorBackendService};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct LessonPlanLoader {
    backend: Arc<dyn TutorBackendService>,
    /// Settle time before a topic switch actually fetches.
    debounce: Duration,
    /// Minimum spacing between progress-triggered reloads.
    throttle: Duration,
    ticket: AtomicU64,
    displayed: RwLock<Vec<LessonPlan>>,
    current_topic: Mutex<Option<String>>,
    inflight: Mutex<CancellationToken>,
    last_progress_reload: Mutex<Option<Instant>>,
}

impl LessonPlanLoader {
    pub fn new(backend: Arc<dyn TutorBackendService>, debounce: Duration, throttle: Duration) -> Self {
        Self {
            backend,
            debounce,
            throttle,
            ticket: AtomicU64::new(0),
            displayed: RwLock::new(Vec::new()),
            current_topic: Mutex::new(None),
            inflight: Mutex::new(CancellationToken::new()),
            last_progress_reload: Mutex::new(None),
        }
    }

    /// The list the UI should currently display.
    pub fn displayed(&self) -> Vec<LessonPlan> {
        self.displayed.read().unwrap().clone()
    }

    /// Switches to `topic_id` and reloads its lesson plans. Returns
    /// `Ok(None)` when this request was superseded by a newer switch before
    /// its response could be applied.
    pub async fn switch_topic(&self, topic_id: &str) -> PortResult<Option<Vec<LessonPlan>>> {
        let ticket = self.take_ticket();
        *self.current_topic.lock().unwrap() = Some(topic_id.to_string());
        let cancel = self.supersede_inflight();

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
            if self.is_superseded(ticket) {
                debug!(topic_id, "Topic switch debounced away by a newer switch.");
                return Ok(None);
            }
        }

        self.fetch(topic_id, ticket, cancel).await
    }

    /// Reloads the current topic in response to a progress broadcast, at
    /// most once per throttle window. The window only starts when a fetch
    /// is actually dispatched; a reload that short-circuits (no current
    /// topic) does not suppress the next one.
    pub async fn reload_on_progress(&self) -> PortResult<Option<Vec<LessonPlan>>> {
        {
            let last = self.last_progress_reload.lock().unwrap();
            if let Some(at) = *last {
                if at.elapsed() < self.throttle {
                    debug!("Progress reload throttled.");
                    return Ok(None);
                }
            }
        }

        let Some(topic_id) = self.current_topic.lock().unwrap().clone() else {
            return Ok(None);
        };
        let ticket = self.take_ticket();
        let cancel = self.supersede_inflight();
        *self.last_progress_reload.lock().unwrap() = Some(Instant::now());
        self.fetch(&topic_id, ticket, cancel).await
    }

    async fn fetch(
        &self,
        topic_id: &str,
        ticket: u64,
        cancel: CancellationToken,
    ) -> PortResult<Option<Vec<LessonPlan>>> {
        let plans = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(topic_id, "Lesson-plan fetch cancelled by a newer request.");
                return Ok(None);
            }
            result = self.backend.lesson_plans(topic_id) => result?,
        };

        if self.is_superseded(ticket) {
            debug!(topic_id, "Discarding stale lesson-plan response.");
            return Ok(None);
        }
        *self.displayed.write().unwrap() = plans.clone();
        Ok(Some(plans))
    }

    fn take_ticket(&self) -> u64 {
        self.ticket.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.ticket.load(Ordering::SeqCst) != ticket
    }

    /// Cancels the in-flight fetch, if any, and installs a fresh token for
    /// the next one.
    fn supersede_inflight(&self) -> CancellationToken {
        let mut guard = self.inflight.lock().unwrap();
        let superseded = std::mem::replace(&mut *guard, CancellationToken::new());
        superseded.cancel();
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedBackend;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    fn plans(topic: &str, lesson: &str) -> Vec<LessonPlan> {
        vec![LessonPlan {
            id: lesson.into(),
            topic_id: topic.into(),
            title: format!("Lesson {lesson}"),
        }]
    }

    fn backend_with_topics() -> Arc<ScriptedBackend> {
        let backend = Arc::new(ScriptedBackend::new());
        let mut by_topic = backend.plans_by_topic.lock().unwrap();
        by_topic.insert("topic-a".into(), plans("topic-a", "lesson-a"));
        by_topic.insert("topic-b".into(), plans("topic-b", "lesson-b"));
        drop(by_topic);
        backend
    }

    #[tokio::test]
    async fn stale_response_is_discarded_after_topic_switch() {
        let backend = backend_with_topics();
        let gate = Arc::new(Notify::new());
        backend
            .plan_gates
            .lock()
            .unwrap()
            .insert("topic-a".into(), gate.clone());

        let loader = Arc::new(LessonPlanLoader::new(
            backend.clone(),
            Duration::ZERO,
            Duration::ZERO,
        ));

        // Topic A's fetch starts and parks on the gate.
        let loader_a = loader.clone();
        let task_a = tokio::spawn(async move { loader_a.switch_topic("topic-a").await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // The user switches to topic B before A resolves.
        let applied = loader.switch_topic("topic-b").await.unwrap().unwrap();
        assert_eq!(applied[0].id, "lesson-b");

        // A's late outcome is discarded, not applied.
        gate.notify_one();
        let stale = task_a.await.unwrap().unwrap();
        assert_eq!(stale, None);
        assert_eq!(loader.displayed()[0].id, "lesson-b");
    }

    #[tokio::test]
    async fn rapid_switches_debounce_to_the_last_topic() {
        let backend = backend_with_topics();
        let loader = Arc::new(LessonPlanLoader::new(
            backend.clone(),
            Duration::from_millis(100),
            Duration::ZERO,
        ));

        let loader_a = loader.clone();
        let task_a = tokio::spawn(async move { loader_a.switch_topic("topic-a").await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let applied = loader.switch_topic("topic-b").await.unwrap().unwrap();
        assert_eq!(applied[0].id, "lesson-b");

        // The superseded switch never even fetched.
        assert_eq!(task_a.await.unwrap().unwrap(), None);
        assert_eq!(
            backend.lesson_plan_calls.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn progress_reloads_are_throttled() {
        let backend = backend_with_topics();
        let loader = LessonPlanLoader::new(
            backend.clone(),
            Duration::ZERO,
            Duration::from_millis(1500),
        );

        loader.switch_topic("topic-a").await.unwrap();
        assert_eq!(backend.lesson_plan_calls.load(Ordering::SeqCst), 1);

        assert!(loader.reload_on_progress().await.unwrap().is_some());
        assert_eq!(backend.lesson_plan_calls.load(Ordering::SeqCst), 2);

        // Within the throttle window: no extra fetch.
        assert!(loader.reload_on_progress().await.unwrap().is_none());
        assert_eq!(backend.lesson_plan_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn skipped_reload_does_not_consume_throttle_window() {
        let backend = backend_with_topics();
        let loader = LessonPlanLoader::new(
            backend.clone(),
            Duration::ZERO,
            Duration::from_secs(3600),
        );

        // No topic selected yet: the reload short-circuits.
        assert!(loader.reload_on_progress().await.unwrap().is_none());

        loader.switch_topic("topic-a").await.unwrap();
        assert_eq!(backend.lesson_plan_calls.load(Ordering::SeqCst), 1);

        // The short-circuited reload did not start the window, so the
        // first real reload goes through.
        assert!(loader.reload_on_progress().await.unwrap().is_some());
        assert_eq!(backend.lesson_plan_calls.load(Ordering::SeqCst), 2);
    }
}

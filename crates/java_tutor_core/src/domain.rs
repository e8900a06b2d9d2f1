//! crates/java_tutor_core/src/domain.rs
//!
//! Defines the pure, core data structures for the tutoring client.
//! These structs are independent of any storage backend or transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

//=========================================================================================
// Session and Transcript
//=========================================================================================

/// A resumable tutoring conversation tied to one user, topic, and lesson.
///
/// The session identifier is opaque: the backend hands it out and some
/// endpoints require it back in numeric form (see [`Session::numeric_id`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub topic_id: Option<String>,
    pub lesson_id: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
    pub active: bool,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Parses the opaque session identifier into the numeric form some
    /// backend endpoints require. An unparsable id yields `None` with a
    /// logged warning; the dependent action is skipped, never crashed.
    pub fn numeric_id(&self) -> Option<i64> {
        match self.id.trim().parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                warn!(session_id = %self.id, "Session id is not numeric; skipping id-dependent call.");
                None
            }
        }
    }

    /// Marks the session as touched now.
    pub fn touch(&mut self) {
        self.last_activity_at = Utc::now();
    }
}

/// Who produced a transcript turn. The two tutor variants are the A/B
/// personas the product experiments with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    User,
    TutorA,
    TutorB,
}

/// One turn in a session transcript. Append-only: messages are never
/// mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stored as a string; older backend payloads carry numeric ids, which
    /// are coerced on deserialization.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub sender: MessageSender,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_snippet: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a transcript turn with a fresh id, stamped now.
    pub fn new(sender: MessageSender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            text: text.into(),
            code_snippet: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_code_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.code_snippet = Some(snippet.into());
        self
    }
}

/// Accepts a JSON string or number and coerces it to `String`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number for id, got {other}"
        ))),
    }
}

//=========================================================================================
// Session Metadata
//=========================================================================================

/// Free-form per-session key/value data (selected topic/lesson snapshot,
/// UI preferences, last active tab).
///
/// Writes are shallow merges: a partial update only replaces the keys it
/// carries, so unrelated fields survive concurrent partial updates from
/// different UI flows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMetadata(pub BTreeMap<String, serde_json::Value>);

impl SessionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shallow-merges `partial` into `self`. Incoming values win per key.
    pub fn merge(&mut self, partial: &SessionMetadata) {
        for (key, value) in &partial.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Convenience accessor for string-valued entries.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//=========================================================================================
// Lesson Catalog Records (consumed from the backend, opaque beyond ids)
//=========================================================================================

/// A lesson entry in a topic's lesson plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonPlan {
    pub id: String,
    pub topic_id: String,
    pub title: String,
}

/// A quiz the backend resolved for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizRef {
    pub id: String,
    pub module_id: String,
    pub title: String,
}

/// Pass state of one quiz within a lesson's modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizStatus {
    pub id: String,
    pub passed: bool,
}

/// A practice exercise the backend resolved for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeRef {
    pub id: String,
    pub title: String,
}

/// The user's answer to the post-activity tutor-preference poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TutorPreference {
    TutorA,
    TutorB,
    NoPreference,
}

//=========================================================================================
// Engagement / Sequencer Vocabulary
//=========================================================================================

/// The lesson-cycle stage of the activity sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    QuizPending,
    QuizActive,
    PracticePending,
    PracticeActive,
    PollPending,
    Completed,
}

/// Which automatic activity is currently live, the idempotency tag that
/// prevents a threshold crossing from firing twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredActivity {
    None,
    Quiz,
    Practice,
}

/// Read-only diagnostics snapshot of the engagement state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngagementSnapshot {
    pub score: u32,
    pub quiz_threshold_reached: bool,
    pub practice_threshold_reached: bool,
    pub triggered_activity: TriggeredActivity,
    pub stage: Stage,
}

/// Threshold configuration supplied when tracking starts. Immutable for
/// the lifetime of one tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdConfig {
    /// Score at which the quiz gate fires.
    pub quiz_threshold: u32,
    /// Score at which the practice gate arms (fires only after quiz completion).
    pub practice_threshold: u32,
    /// When false, scoring still accumulates but no activity is ever triggered.
    pub auto_trigger: bool,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            quiz_threshold: 30,
            practice_threshold: 70,
            auto_trigger: true,
        }
    }
}

//! crates/java_tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the engagement core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete REST backend and storage medium.

use async_trait::async_trait;
use crate::domain::{
    LessonPlan, Message, PracticeRef, QuizRef, QuizStatus, Session, SessionMetadata,
    TutorPreference,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., HTTP, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The REST backend of the tutoring product. Everything this client knows
/// about the server goes through here; response shapes beyond ids and pass
/// state are opaque to the core.
#[async_trait]
pub trait TutorBackendService: Send + Sync {
    // --- Session lifecycle ---

    /// Looks up the user's currently active session, if any.
    async fn fetch_active_session(&self, user_id: &str) -> PortResult<Option<Session>>;

    /// Marks a known session active again and returns its fresh state.
    async fn reactivate_session(&self, session_id: &str) -> PortResult<Session>;

    /// Deactivates a session server-side.
    async fn deactivate_session(&self, session_id: &str) -> PortResult<()>;

    // --- Conversation and metadata sync ---

    async fn push_conversation(&self, session_id: i64, messages: &[Message]) -> PortResult<()>;

    async fn push_metadata(&self, session_id: i64, metadata: &SessionMetadata) -> PortResult<()>;

    // --- Quiz / practice resolution ---

    /// Pass state of every quiz across the lesson's modules.
    async fn lesson_quiz_statuses(&self, lesson_id: &str) -> PortResult<Vec<QuizStatus>>;

    /// Resolves the next quiz to present for a lesson, if one remains.
    async fn next_quiz(&self, lesson_id: &str) -> PortResult<Option<QuizRef>>;

    /// Resolves a practice exercise for a lesson, if one exists.
    async fn next_practice(&self, lesson_id: &str) -> PortResult<Option<PracticeRef>>;

    // --- Poll and progress ---

    async fn log_preference(&self, session_id: i64, choice: TutorPreference) -> PortResult<()>;

    /// Backend-reported completion percentage (0-100) for a lesson.
    async fn lesson_progress(&self, user_id: &str, lesson_id: &str) -> PortResult<u8>;

    // --- Catalog ---

    async fn lesson_plans(&self, topic_id: &str) -> PortResult<Vec<LessonPlan>>;
}

/// Per-user local persistence, the analog of browser local storage.
///
/// Any other writer may touch the backing medium between calls, so
/// implementations must re-read it on every `get` rather than trusting an
/// in-memory snapshot. Last write wins; values are JSON strings.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> PortResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> PortResult<()>;
    fn remove(&self, key: &str) -> PortResult<()>;
}

//! crates/java_tutor_core/src/lib.rs
//!
//! The engagement core: domain types, service ports, and the pure progress
//! weighting model. Everything transport- and storage-specific lives in the
//! client crate's adapters.

pub mod domain;
pub mod ports;
pub mod progress;

pub use domain::{
    EngagementSnapshot, LessonPlan, Message, MessageSender, PracticeRef, QuizRef, QuizStatus,
    Session, SessionMetadata, Stage, ThresholdConfig, TriggeredActivity, TutorPreference,
};
pub use ports::{LocalStore, PortError, PortResult, TutorBackendService};
pub use progress::{compute_progress, ProgressCounters, ProgressReport, ProgressStatus};

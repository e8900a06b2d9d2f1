//! services/client/src/lib.rs
//!
//! The engagement runtime for the Java tutoring product: session store,
//! engagement accumulator, activity sequencer, lesson-plan loader, and
//! background sync, wired over the `java_tutor_core` ports.

pub mod adapters;
pub mod bus;
pub mod config;
pub mod engagement;
pub mod error;
pub mod lessons;
pub mod runtime;
pub mod sequencer;
pub mod store;
pub mod sync;
pub mod telemetry;
pub mod token;

#[cfg(test)]
pub mod testutil;

pub use bus::{BroadcastBus, BusMessage, Subscription, Topic};
pub use config::{Config, ConfigError};
pub use engagement::EngagementTracker;
pub use error::ClientError;
pub use lessons::LessonPlanLoader;
pub use runtime::TutorClient;
pub use sequencer::{ActivityEvent, ActivitySequencer};
pub use store::SessionStore;
pub use sync::SyncScheduler;

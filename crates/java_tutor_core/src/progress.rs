//! crates/java_tutor_core/src/progress.rs
//!
//! The progress weighting model: a pure mapping from four weighted
//! activity counters to a single 0-100 lesson-completion percentage.
//! No side effects; safe to recompute at any time.

use serde::{Deserialize, Serialize};

//=========================================================================================
// Category Caps
//=========================================================================================

/// Ceiling applied to each category before summation.
pub const INTERACTION_CAP: f64 = 30.0;
pub const CODE_EXECUTION_CAP: f64 = 40.0;
pub const TIME_SPENT_CAP: f64 = 5.0;
pub const KNOWLEDGE_CHECK_CAP: f64 = 30.0;

/// Ceiling applied to a single increment, so one action cannot inflate a
/// category disproportionately.
const INTERACTION_STEP_CAP: f64 = 2.0;
const CODE_EXECUTION_STEP_CAP: f64 = 5.0;
const TIME_SPENT_STEP_CAP: f64 = 1.0;
const KNOWLEDGE_CHECK_STEP_CAP: f64 = 10.0;

//=========================================================================================
// Counters
//=========================================================================================

/// The four weighted counters behind a lesson's completion percentage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressCounters {
    pub interaction: f64,
    pub code_execution: f64,
    pub time_spent: f64,
    pub knowledge_check: f64,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interaction(&mut self, points: f64) {
        self.interaction += clamp_step(points, INTERACTION_STEP_CAP);
    }

    pub fn add_code_execution(&mut self, points: f64) {
        self.code_execution += clamp_step(points, CODE_EXECUTION_STEP_CAP);
    }

    pub fn add_time_spent(&mut self, points: f64) {
        self.time_spent += clamp_step(points, TIME_SPENT_STEP_CAP);
    }

    pub fn add_knowledge_check(&mut self, points: f64) {
        self.knowledge_check += clamp_step(points, KNOWLEDGE_CHECK_STEP_CAP);
    }

    /// Per-category contributions after the category ceilings are applied.
    pub fn contributions(&self) -> [f64; 4] {
        [
            self.interaction.min(INTERACTION_CAP),
            self.code_execution.min(CODE_EXECUTION_CAP),
            self.time_spent.min(TIME_SPENT_CAP),
            self.knowledge_check.min(KNOWLEDGE_CHECK_CAP),
        ]
    }
}

/// Negative increments are ignored; oversized ones are clamped to the step cap.
fn clamp_step(points: f64, step_cap: f64) -> f64 {
    points.clamp(0.0, step_cap)
}

//=========================================================================================
// Report
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressReport {
    /// 0-100, rounded to the nearest integer.
    pub percent: u8,
    pub status: ProgressStatus,
}

/// Maps the counters to a completion percentage and status.
pub fn compute_progress(counters: &ProgressCounters) -> ProgressReport {
    let total: f64 = counters.contributions().iter().sum();
    let percent = total.min(100.0).round() as u8;
    let status = if percent >= 100 {
        ProgressStatus::Completed
    } else if total > 0.0 {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::NotStarted
    };
    ProgressReport { percent, status }
}

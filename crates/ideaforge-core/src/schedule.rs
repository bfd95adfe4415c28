use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scheduler state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerPhase {
    /// No run in progress.
    #[default]
    Idle,
    /// A run holds the guard.
    Running,
}

/// Persisted scheduler state: the guard against overlapping runs plus the
/// bookkeeping needed to fire each schedule slot once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    /// IDLE or RUNNING.
    #[serde(default)]
    pub phase: SchedulerPhase,
    /// When the last run finished, successful or not.
    #[serde(default)]
    pub last_run_at: Option<DateTime<Utc>>,
    /// The most recent schedule slot that fired.
    #[serde(default)]
    pub last_slot: Option<DateTime<Utc>>,
}

impl ScheduleState {
    /// `true` while a run holds the guard.
    pub fn is_running(&self) -> bool {
        self.phase == SchedulerPhase::Running
    }

    /// Whether `slot` is newer than anything already fired.
    pub fn slot_pending(&self, slot: DateTime<Utc>) -> bool {
        self.last_slot.map_or(true, |last| slot > last)
    }
}

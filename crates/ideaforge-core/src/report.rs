use crate::idea::Fingerprint;
use crate::record::ProjectStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a single idea during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaOutcome {
    /// Dedup key.
    pub fingerprint: Fingerprint,
    /// Short human title.
    pub title: String,
    /// Status the record was left in.
    pub status: ProjectStatus,
    /// Repository URL once published.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Failure detail, if any.
    #[serde(default)]
    pub error: Option<String>,
}

/// Summary of one orchestrator invocation.
///
/// Per-idea failures show up in the counters and in `outcomes`; they never
/// abort the run. A discovery failure leaves every counter at zero and sets
/// `discovery_error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique per run.
    pub run_id: Uuid,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub finished_at: DateTime<Utc>,
    /// Candidate ideas considered after sorting and in-batch dedup.
    pub discovered: usize,
    /// Ideas that reached PUBLISHED in this run.
    pub published: usize,
    /// Ideas that reached FAILED in this run.
    pub failed: usize,
    /// Ideas that failed transiently and were left for a later run.
    pub retry_scheduled: usize,
    /// Ideas skipped because their record was published, failed or in flight.
    pub skipped: usize,
    /// Set when discovery was unavailable; nothing was processed.
    #[serde(default)]
    pub discovery_error: Option<String>,
    /// The run stopped early because shutdown was requested.
    #[serde(default)]
    pub interrupted: bool,
    /// Per-idea results, in processing order.
    #[serde(default)]
    pub outcomes: Vec<IdeaOutcome>,
}

impl RunReport {
    /// Report for a run starting now.
    pub fn empty() -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: now,
            discovered: 0,
            published: 0,
            failed: 0,
            retry_scheduled: 0,
            skipped: 0,
            discovery_error: None,
            interrupted: false,
            outcomes: Vec::new(),
        }
    }

    /// Ideas that actually went through an external call this run.
    pub fn processed(&self) -> usize {
        self.published + self.failed + self.retry_scheduled
    }

    /// Count one idea's outcome.
    pub fn record(&mut self, outcome: IdeaOutcome) {
        match outcome.status {
            ProjectStatus::Published => self.published += 1,
            ProjectStatus::Failed => self.failed += 1,
            _ => self.retry_scheduled += 1,
        }
        self.outcomes.push(outcome);
    }

    /// Stamp the end time.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if let Some(err) = &self.discovery_error {
            return format!("Run aborted: {err}");
        }
        format!(
            "Run complete: {} published, {} failed, {} retry scheduled, {} skipped of {} candidates{}",
            self.published,
            self.failed,
            self.retry_scheduled,
            self.skipped,
            self.discovered,
            if self.interrupted { " (interrupted)" } else { "" }
        )
    }
}

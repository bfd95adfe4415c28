use crate::error::{IdeaforgeError, IdeaforgeResult};
use crate::idea::{Fingerprint, Idea};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline status of a project record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Known, waiting for a development session.
    Pending,
    /// A development session is in flight.
    Developing,
    /// Artifacts exist, waiting for publishing.
    Developed,
    /// A publishing call is in flight.
    Publishing,
    /// Terminal: the repository exists.
    Published,
    /// Terminal until re-queued by an operator.
    Failed,
}

impl ProjectStatus {
    /// Every status, in pipeline order.
    pub const ALL: [ProjectStatus; 6] = [
        ProjectStatus::Pending,
        ProjectStatus::Developing,
        ProjectStatus::Developed,
        ProjectStatus::Publishing,
        ProjectStatus::Published,
        ProjectStatus::Failed,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Developing => "developing",
            ProjectStatus::Developed => "developed",
            ProjectStatus::Publishing => "publishing",
            ProjectStatus::Published => "published",
            ProjectStatus::Failed => "failed",
        }
    }

    /// Whether an external call is (or was, before a crash) in flight.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, ProjectStatus::Developing | ProjectStatus::Publishing)
    }

    /// Whether `self -> next` is an edge of the status machine.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Pending, Developing)
                | (Developing, Developed | Pending | Failed)
                | (Developed, Publishing)
                | (Publishing, Published | Developed | Failed)
                | (Failed, Pending | Developed)
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = IdeaforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        ProjectStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == lower)
            .ok_or_else(|| IdeaforgeError::Config(format!("Unknown status '{s}'")))
    }
}

/// Opaque reference to an artifact set produced by the development service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactRef(pub String);

impl ArtifactRef {
    /// Wrap a service-specific reference.
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The raw reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable state of one idea moving through the pipeline.
///
/// Exactly one record exists per [`Fingerprint`]. Every status change goes
/// through [`ProjectRecord::transition`], which enforces the transition table
/// and bumps `version` so the store can reject stale writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Dedup key.
    pub fingerprint: Fingerprint,
    /// Snapshot of the idea as first seen.
    pub idea: Idea,
    /// Current pipeline status.
    pub status: ProjectStatus,
    /// Failed attempts since the last success or re-queue.
    pub attempt_count: u32,
    /// Most recent failure, cleared on success.
    #[serde(default)]
    pub last_error: Option<String>,
    /// Artifact set produced by development.
    #[serde(default)]
    pub artifact: Option<ArtifactRef>,
    /// Repository URL once published.
    #[serde(default)]
    pub repo_url: Option<String>,
    /// Bumped by every transition; the store rejects non-successor writes.
    pub version: u64,
    /// First persisted.
    pub created_at: DateTime<Utc>,
    /// Last transition.
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// New PENDING record for a freshly seen idea.
    pub fn new(idea: Idea) -> Self {
        let now = Utc::now();
        Self {
            fingerprint: idea.fingerprint(),
            idea,
            status: ProjectStatus::Pending,
            attempt_count: 0,
            last_error: None,
            artifact: None,
            repo_url: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, or fail without touching the record.
    pub fn transition(&mut self, next: ProjectStatus) -> IdeaforgeResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(IdeaforgeError::InvalidTransition {
                fingerprint: self.fingerprint.to_string(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// PUBLISHED or FAILED.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ProjectStatus::Published | ProjectStatus::Failed)
    }

    /// Age of the last persisted change, relative to `now`.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of probing the collaborators a run depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// When the probe ran.
    pub checked_at: DateTime<Utc>,
    /// The development service answered its health endpoint in time.
    pub development_healthy: bool,
    /// Publishing credentials are present.
    pub publishing_configured: bool,
}

impl HealthStatus {
    /// `true` when a run could publish right now.
    pub fn is_healthy(&self) -> bool {
        self.development_healthy && self.publishing_configured
    }

    /// Names of the failing checks.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        if !self.development_healthy {
            problems.push("development");
        }
        if !self.publishing_configured {
            problems.push("publishing");
        }
        problems
    }
}

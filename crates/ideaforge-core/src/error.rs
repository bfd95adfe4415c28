use crate::record::ProjectStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A convenience `Result` alias using [`IdeaforgeError`].
pub type IdeaforgeResult<T> = Result<T, IdeaforgeError>;

/// Top-level error type for the Ideaforge pipeline.
///
/// Variants map onto the propagation policy of the orchestrator: discovery
/// failures end a run, development/publishing failures stay with one idea,
/// persistence failures abort the run, notification failures are swallowed.
#[derive(Debug, thiserror::Error)]
pub enum IdeaforgeError {
    /// The discovery provider could not produce a trustworthy idea list.
    #[error("Discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// The development service failed or timed out for one idea.
    #[error("Development failed: {0}")]
    DevelopmentFailed(ServiceFailure),

    /// The publishing service failed or timed out for one idea.
    #[error("Publishing failed: {0}")]
    PublishingFailed(ServiceFailure),

    /// The history store could not durably record state.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A notification could not be delivered.
    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    /// A project record was asked to make an illegal status transition.
    #[error("Invalid transition for {fingerprint}: {from} -> {to}")]
    InvalidTransition {
        /// Fingerprint of the offending record.
        fingerprint: String,
        /// Status the record was in.
        from: ProjectStatus,
        /// Status that was requested.
        to: ProjectStatus,
    },

    /// No record exists for the requested fingerprint.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IdeaforgeError {
    /// Whether this error means durable state can no longer be trusted.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            IdeaforgeError::Persistence(_)
                | IdeaforgeError::InvalidTransition { .. }
                | IdeaforgeError::Io(_)
                | IdeaforgeError::Json(_)
        )
    }
}

/// Reason code attached to a failed external service call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// The caller-supplied timeout elapsed.
    Timeout,
    /// The remote session was cancelled.
    Cancelled,
    /// The service rejected the request.
    Rejected,
    /// A repository with the requested name already exists.
    NameCollision,
    /// Credentials were missing or refused.
    AuthFailed,
    /// The service asked us to slow down.
    RateLimited,
    /// Network error or 5xx response.
    Transport,
    /// The response could not be understood.
    Malformed,
    /// The service reported an internal error.
    Internal,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::Timeout => "timeout",
            FailureCode::Cancelled => "cancelled",
            FailureCode::Rejected => "rejected",
            FailureCode::NameCollision => "name_collision",
            FailureCode::AuthFailed => "auth_failed",
            FailureCode::RateLimited => "rate_limited",
            FailureCode::Transport => "transport",
            FailureCode::Malformed => "malformed",
            FailureCode::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Structured failure returned by the development and publishing services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFailure {
    /// Machine-readable class of the failure.
    pub code: FailureCode,
    /// Detail from the service.
    pub message: String,
}

impl ServiceFailure {
    /// Failure with an explicit code.
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Failure for a call that outlived its deadline.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            FailureCode::Timeout,
            format!("no response within {}s", after.as_secs()),
        )
    }
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

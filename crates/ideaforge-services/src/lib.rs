//! External collaborators of the pipeline.
//!
//! Each boundary is a trait so the orchestrator can be driven by real HTTP
//! services in production and by deterministic mocks in tests.
//!
//! # Main types
//!
//! - [`DiscoveryProvider`] — Produces a finite stream of candidate [`Idea`](ideaforge_core::Idea)s.
//! - [`DevelopmentService`] — Runs a long development session and returns an artifact reference.
//! - [`PublishingService`] — Turns an artifact set into a repository.
//! - [`Notifier`] / [`NotifierSet`] — Best-effort status messages.

/// Long-running development sessions.
pub mod development;
/// Idea discovery providers.
pub mod discovery;
/// Pipeline notifications.
pub mod notifier;
/// Repository publishing.
pub mod publishing;

pub use development::{DevelopmentRequest, DevelopmentService, HttpDevelopmentService};
pub use discovery::{
    DiscoveryProvider, DiscoveryRequest, HttpDiscoveryProvider, IdeaSeed, IdeaStream,
    StaticDiscoveryProvider,
};
pub use notifier::{LogNotifier, Notifier, NotifierSet, PipelineEvent, TelegramNotifier};
pub use publishing::{
    HttpPublishingService, PublishRequest, PublishingService, RepoHandle, Visibility,
};

use ideaforge_core::{FailureCode, ServiceFailure};
use reqwest::StatusCode;

/// Map an HTTP status from a collaborator to a failure code.
pub(crate) fn failure_code_for(status: StatusCode) -> FailureCode {
    match status.as_u16() {
        401 | 403 => FailureCode::AuthFailed,
        409 | 422 => FailureCode::NameCollision,
        429 => FailureCode::RateLimited,
        400..=499 => FailureCode::Rejected,
        _ => FailureCode::Transport,
    }
}

pub(crate) fn transport_failure(context: &str, err: &reqwest::Error) -> ServiceFailure {
    if err.is_timeout() {
        ServiceFailure::new(FailureCode::Timeout, format!("{context}: {err}"))
    } else if err.is_decode() {
        ServiceFailure::new(FailureCode::Malformed, format!("{context}: {err}"))
    } else {
        ServiceFailure::new(FailureCode::Transport, format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_code_for_status() {
        assert_eq!(failure_code_for(StatusCode::UNAUTHORIZED), FailureCode::AuthFailed);
        assert_eq!(failure_code_for(StatusCode::CONFLICT), FailureCode::NameCollision);
        assert_eq!(failure_code_for(StatusCode::TOO_MANY_REQUESTS), FailureCode::RateLimited);
        assert_eq!(failure_code_for(StatusCode::BAD_REQUEST), FailureCode::Rejected);
        assert_eq!(failure_code_for(StatusCode::BAD_GATEWAY), FailureCode::Transport);
    }
}

use crate::{failure_code_for, transport_failure};
use async_trait::async_trait;
use ideaforge_core::{ArtifactRef, Category, FailureCode, Idea, ServiceFailure};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the development service is asked to build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevelopmentRequest {
    /// Short human title.
    pub title: String,
    /// Kind of project.
    pub category: Category,
    /// Falls back to the title when the idea has none.
    pub description: String,
}

impl DevelopmentRequest {
    /// Request for building `idea`.
    pub fn for_idea(idea: &Idea) -> Self {
        Self {
            title: idea.title.clone(),
            category: idea.category,
            description: idea.brief().to_string(),
        }
    }
}

/// Multi-agent development backend.
///
/// Sessions run for tens of minutes. Implementations do not enforce the
/// caller's deadline themselves; the orchestrator wraps `develop` in a
/// timeout and drops the future when it expires.
#[async_trait]
pub trait DevelopmentService: Send + Sync {
    /// Build the project and return a reference to its artifact set.
    async fn develop(&self, request: &DevelopmentRequest) -> Result<ArtifactRef, ServiceFailure>;

    /// Whether the service is reachable and ready.
    async fn health_check(&self) -> bool {
        true
    }
}

// ── HTTP session client ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct StartSession<'a> {
    title: &'a str,
    category: Category,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    workflow: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SessionStarted {
    session_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SessionState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Deserialize)]
struct SessionStatus {
    status: SessionState,
    #[serde(default)]
    artifact: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Health {
    status: String,
}

/// Client for a development server that exposes sessions over HTTP.
///
/// `POST <base>/sessions` starts a session, `GET <base>/sessions/<id>` is
/// polled until it completes, fails, or is cancelled.
pub struct HttpDevelopmentService {
    base_url: String,
    client: reqwest::Client,
    poll_interval: Duration,
    workflow: Option<String>,
    max_poll_errors: u32,
}

impl HttpDevelopmentService {
    /// Client for the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            poll_interval: Duration::from_secs(10),
            workflow: None,
            max_poll_errors: 5,
        }
    }

    /// How often to poll a running session.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Name of the server-side workflow definition to run.
    pub fn with_workflow(mut self, workflow: impl Into<String>) -> Self {
        self.workflow = Some(workflow.into());
        self
    }

    async fn start(&self, request: &DevelopmentRequest) -> Result<String, ServiceFailure> {
        let body = StartSession {
            title: &request.title,
            category: request.category,
            description: &request.description,
            workflow: self.workflow.as_deref(),
        };
        let response = self
            .client
            .post(format!("{}/sessions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_failure("start session", &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceFailure::new(
                failure_code_for(status),
                format!("start session returned {status}: {text}"),
            ));
        }
        let started: SessionStarted = response
            .json()
            .await
            .map_err(|e| transport_failure("start session", &e))?;
        Ok(started.session_id)
    }

    async fn poll(&self, session_id: &str) -> Result<SessionStatus, ServiceFailure> {
        let response = self
            .client
            .get(format!("{}/sessions/{session_id}", self.base_url))
            .send()
            .await
            .map_err(|e| transport_failure("poll session", &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceFailure::new(
                failure_code_for(status),
                format!("poll session returned {status}"),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| transport_failure("poll session", &e))
    }
}

#[async_trait]
impl DevelopmentService for HttpDevelopmentService {
    async fn develop(&self, request: &DevelopmentRequest) -> Result<ArtifactRef, ServiceFailure> {
        let session_id = self.start(request).await?;
        info!(session_id = %session_id, title = %request.title, "Development session started");

        let mut consecutive_errors = 0;
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let status = match self.poll(&session_id).await {
                Ok(status) => {
                    consecutive_errors = 0;
                    status
                }
                Err(failure) if failure.code == FailureCode::Transport => {
                    consecutive_errors += 1;
                    warn!(session_id = %session_id, attempt = consecutive_errors, error = %failure, "Session poll failed");
                    if consecutive_errors >= self.max_poll_errors {
                        return Err(failure);
                    }
                    continue;
                }
                Err(failure) => return Err(failure),
            };

            match status.status {
                SessionState::Queued | SessionState::Running => {
                    debug!(session_id = %session_id, "Session still running");
                }
                SessionState::Completed => {
                    let artifact = status.artifact.unwrap_or_else(|| session_id.clone());
                    info!(session_id = %session_id, artifact = %artifact, "Development session completed");
                    return Ok(ArtifactRef::new(artifact));
                }
                SessionState::Failed => {
                    return Err(ServiceFailure::new(
                        FailureCode::Internal,
                        status.error.unwrap_or_else(|| "session failed".to_string()),
                    ));
                }
                SessionState::Cancelled => {
                    return Err(ServiceFailure::new(
                        FailureCode::Cancelled,
                        status.error.unwrap_or_else(|| "session cancelled".to_string()),
                    ));
                }
            }
        }
    }

    async fn health_check(&self) -> bool {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<Health>()
                .await
                .map(|h| h.status == "healthy")
                .unwrap_or(false),
            _ => false,
        }
    }
}

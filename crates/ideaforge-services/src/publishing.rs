use crate::{failure_code_for, transport_failure};
use async_trait::async_trait;
use ideaforge_core::{ArtifactRef, FailureCode, ServiceFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Repository visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to everyone.
    #[default]
    Public,
    /// Visible to the owner only.
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// What to publish and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Repository name.
    pub name: String,
    /// Artifact set produced by development.
    pub artifact: ArtifactRef,
    /// Repository visibility.
    pub visibility: Visibility,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Handle of a created repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Browser URL of the repository.
    pub url: String,
    /// Name as created, which may differ from the request.
    #[serde(default)]
    pub name: String,
}

/// Turns an artifact set into a repository.
#[async_trait]
pub trait PublishingService: Send + Sync {
    /// Create a repository from the artifact set.
    async fn publish(&self, request: &PublishRequest) -> Result<RepoHandle, ServiceFailure>;

    /// Whether credentials are present; used by the operator health check.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Publishing backend reachable over HTTP with bearer-token auth.
///
/// `POST <base>/repositories` with a [`PublishRequest`] body; expects a
/// [`RepoHandle`] back. 409/422 mean the name is taken.
pub struct HttpPublishingService {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpPublishingService {
    /// Client for `base_url`; publishing fails with `auth_failed` without a token.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PublishingService for HttpPublishingService {
    async fn publish(&self, request: &PublishRequest) -> Result<RepoHandle, ServiceFailure> {
        let token = self.token.as_deref().ok_or_else(|| {
            ServiceFailure::new(FailureCode::AuthFailed, "no publishing token configured")
        })?;

        let response = self
            .client
            .post(format!("{}/repositories", self.base_url))
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|e| transport_failure("publish", &e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceFailure::new(
                failure_code_for(status),
                format!("publish '{}' returned {status}: {text}", request.name),
            ));
        }

        let mut handle: RepoHandle = response
            .json()
            .await
            .map_err(|e| transport_failure("publish", &e))?;
        if handle.name.is_empty() {
            handle.name = request.name.clone();
        }
        info!(name = %handle.name, url = %handle.url, "Repository published");
        Ok(handle)
    }

    fn is_configured(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> PublishRequest {
        PublishRequest {
            name: "log-analyzer".into(),
            artifact: ArtifactRef::new("warehouse/s-1.tar"),
            visibility: Visibility::Public,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_publish_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repositories"))
            .and(header("authorization", "Bearer t0k"))
            .and(body_partial_json(serde_json::json!({
                "name": "log-analyzer", "artifact": "warehouse/s-1.tar", "visibility": "public"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "url": "https://git.example.com/forge/log-analyzer"
            })))
            .mount(&server)
            .await;

        let service = HttpPublishingService::new(server.uri(), Some("t0k".into()));
        let handle = service.publish(&request()).await.unwrap();
        assert_eq!(handle.url, "https://git.example.com/forge/log-analyzer");
        assert_eq!(handle.name, "log-analyzer");
    }

    #[tokio::test]
    async fn test_publish_maps_error_codes() {
        for (status, code) in [
            (409, FailureCode::NameCollision),
            (401, FailureCode::AuthFailed),
            (429, FailureCode::RateLimited),
            (500, FailureCode::Transport),
        ] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/repositories"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
            let service = HttpPublishingService::new(server.uri(), Some("t".into()));
            let failure = service.publish(&request()).await.unwrap_err();
            assert_eq!(failure.code, code, "status {status}");
        }
    }

    #[tokio::test]
    async fn test_publish_without_token_fails_fast() {
        let service = HttpPublishingService::new("http://127.0.0.1:9", None);
        assert!(!service.is_configured());
        let failure = service.publish(&request()).await.unwrap_err();
        assert_eq!(failure.code, FailureCode::AuthFailed);
    }
}

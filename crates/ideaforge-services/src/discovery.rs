use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream, StreamExt};
use ideaforge_core::{Category, Idea, IdeaforgeError, IdeaforgeResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A finite, single-use stream of discovered ideas.
///
/// The stream cannot be restarted; an `Err` item means the whole fetch is
/// untrustworthy.
pub type IdeaStream = BoxStream<'static, IdeaforgeResult<Idea>>;

/// Parameters of one discovery fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Maximum number of ideas wanted.
    pub limit: usize,
    /// Only ideas of this category.
    #[serde(default)]
    pub category: Option<Category>,
}

impl DiscoveryRequest {
    /// Request for at most `limit` ideas.
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            category: None,
        }
    }

    /// Restrict to one category.
    pub fn with_category(mut self, category: Option<Category>) -> Self {
        self.category = category;
        self
    }
}

/// Source of candidate ideas.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Start a fetch. Failing to start and failing mid-stream are both
    /// reported as errors; the caller treats them the same way.
    async fn discover(&self, request: &DiscoveryRequest) -> IdeaforgeResult<IdeaStream>;
}

/// Wire and config shape of an idea before it gets an id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdeaSeed {
    /// Short human title.
    pub title: String,
    /// Origin of the idea.
    pub source: String,
    /// Kind of project.
    pub category: Category,
    /// Ranking weight.
    pub score: f64,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Link to the source material.
    #[serde(default)]
    pub reference_url: Option<String>,
}

impl IdeaSeed {
    /// Stamp an id and discovery time. A NaN or infinite score is rejected.
    pub fn into_idea(self) -> IdeaforgeResult<Idea> {
        if !self.score.is_finite() {
            return Err(IdeaforgeError::DiscoveryUnavailable(format!(
                "idea '{}' has a non-finite score ({})",
                self.title, self.score
            )));
        }
        let mut idea = Idea::new(self.title, self.source, self.category, self.score);
        idea.description = self.description;
        idea.reference_url = self.reference_url;
        Ok(idea)
    }
}

// ── Static provider ─────────────────────────────────────────────────────────

/// Fixed pool of ideas, typically from the config file.
///
/// Used as the fallback pool when no live discovery service is configured.
pub struct StaticDiscoveryProvider {
    seeds: Vec<IdeaSeed>,
}

impl StaticDiscoveryProvider {
    /// Provider serving `seeds` in order.
    pub fn new(seeds: Vec<IdeaSeed>) -> Self {
        Self { seeds }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

#[async_trait]
impl DiscoveryProvider for StaticDiscoveryProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn discover(&self, request: &DiscoveryRequest) -> IdeaforgeResult<IdeaStream> {
        let now = Utc::now();
        let ideas: Vec<IdeaforgeResult<Idea>> = self
            .seeds
            .iter()
            .filter(|s| request.category.map_or(true, |c| s.category == c))
            .take(request.limit)
            .cloned()
            .map(|s| s.into_idea().map(|idea| idea.discovered_at(now)))
            .collect();
        debug!(count = ideas.len(), "Static discovery pool served");
        Ok(stream::iter(ideas).boxed())
    }
}

// ── HTTP provider ───────────────────────────────────────────────────────────

/// Discovery service reachable over HTTP.
///
/// `GET <base_url>/ideas?limit=N[&category=C]` returning a JSON array of
/// [`IdeaSeed`]s, already ranked by the service.
pub struct HttpDiscoveryProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpDiscoveryProvider {
    /// Client for `GET <base_url>/ideas`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl DiscoveryProvider for HttpDiscoveryProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn discover(&self, request: &DiscoveryRequest) -> IdeaforgeResult<IdeaStream> {
        let url = format!("{}/ideas", self.base_url);
        let mut params: Vec<(&str, String)> = vec![("limit", request.limit.to_string())];
        if let Some(category) = request.category {
            params.push(("category", category.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| IdeaforgeError::DiscoveryUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IdeaforgeError::DiscoveryUnavailable(format!(
                "discovery service returned {status}"
            )));
        }

        let seeds: Vec<IdeaSeed> = response.json().await.map_err(|e| {
            IdeaforgeError::DiscoveryUnavailable(format!("malformed response: {e}"))
        })?;

        info!(count = seeds.len(), "Discovery service returned ideas");
        let now = Utc::now();
        let limit = request.limit;
        Ok(stream::iter(seeds)
            .take(limit)
            .map(move |seed| seed.into_idea().map(|idea| idea.discovered_at(now)))
            .boxed())
    }
}

use async_trait::async_trait;
use ideaforge_core::{Fingerprint, IdeaforgeError, IdeaforgeResult};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// An idea reached a public repository.
    Published {
        /// Dedup key of the idea.
        fingerprint: Fingerprint,
        /// Idea title.
        title: String,
        /// Where it was published.
        repo_url: String,
    },
    /// An idea exhausted its retry budget.
    Failed {
        /// Dedup key of the idea.
        fingerprint: Fingerprint,
        /// Idea title.
        title: String,
        /// Last failure.
        error: String,
    },
    /// One orchestrator run ended.
    RunFinished {
        /// [`RunReport::summary`](ideaforge_core::RunReport::summary) of the run.
        summary: String,
    },
}

impl PipelineEvent {
    /// Human-readable one-liner.
    pub fn message(&self) -> String {
        match self {
            PipelineEvent::Published {
                title, repo_url, ..
            } => format!("Published {title}: {repo_url}"),
            PipelineEvent::Failed { title, error, .. } => {
                format!("Gave up on {title}: {error}")
            }
            PipelineEvent::RunFinished { summary } => summary.clone(),
        }
    }
}

/// Best-effort delivery channel for [`PipelineEvent`]s.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;
    /// Deliver one event.
    async fn notify(&self, event: &PipelineEvent) -> IdeaforgeResult<()>;
}

/// Fan-out over every configured notifier.
///
/// Delivery is fire-and-forget: failures are logged and never returned, and
/// each notifier gets at most `timeout` per event.
#[derive(Clone)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl Default for NotifierSet {
    fn default() -> Self {
        Self {
            notifiers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl NotifierSet {
    /// Empty set with the default per-notifier timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on a single notifier call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register a notifier.
    pub fn add(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    /// Builder form of [`add`](Self::add).
    pub fn with(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.add(notifier);
        self
    }

    /// Number of registered notifiers.
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// `true` when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver to all notifiers, returning how many succeeded.
    pub async fn broadcast(&self, event: &PipelineEvent) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            let result = match tokio::time::timeout(self.timeout, notifier.notify(event)).await {
                Ok(result) => result,
                Err(_) => Err(IdeaforgeError::NotificationFailed(format!(
                    "no answer within {:?}",
                    self.timeout
                ))),
            };
            match result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(notifier = notifier.name(), error = %e, "Notification dropped");
                }
            }
        }
        delivered
    }
}

/// Writes events to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, event: &PipelineEvent) -> IdeaforgeResult<()> {
        info!(event = ?event, "{}", event.message());
        Ok(())
    }
}

// ── Telegram ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API notifier (`sendMessage` to one chat).
pub struct TelegramNotifier {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    /// Notifier for one chat, using the public Bot API host.
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            api_base: "https://api.telegram.org".to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Point at a different Bot API host (self-hosted server, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn notify(&self, event: &PipelineEvent) -> IdeaforgeResult<()> {
        let text = event.message();
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text: &text,
        };

        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| IdeaforgeError::NotificationFailed(format!("Telegram send error: {e}")))?;

        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| IdeaforgeError::NotificationFailed(format!("Telegram parse error: {e}")))?;

        if !body.ok {
            return Err(IdeaforgeError::NotificationFailed(format!(
                "Telegram sendMessage failed: {}",
                body.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

use chrono::FixedOffset;
use ideaforge_core::Category;
use ideaforge_orchestrator::{OrchestratorConfig, RetryPolicy, ScheduleEntry, SchedulerConfig};
use ideaforge_services::{
    DiscoveryProvider, HttpDevelopmentService, HttpDiscoveryProvider, HttpPublishingService,
    IdeaSeed, LogNotifier, NotifierSet, StaticDiscoveryProvider, TelegramNotifier, Visibility,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct IdeaforgeConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub development: DevelopmentConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default = "default_schedule")]
    pub schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_ideas")]
    pub max_ideas: usize,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_discovery_limit")]
    pub discovery_limit: usize,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub resume_backlog: bool,
    /// Reclaim in-flight records idle for this long. Unset disables reclaim.
    #[serde(default)]
    pub stale_after_secs: Option<u64>,
    #[serde(default = "default_discovery_timeout")]
    pub discovery_timeout_secs: u64,
    #[serde(default = "default_development_timeout")]
    pub development_timeout_secs: u64,
    #[serde(default = "default_publishing_timeout")]
    pub publishing_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_ideas: default_max_ideas(),
            retry_limit: default_retry_limit(),
            discovery_limit: default_discovery_limit(),
            category: None,
            visibility: Visibility::default(),
            resume_backlog: false,
            stale_after_secs: None,
            discovery_timeout_secs: default_discovery_timeout(),
            development_timeout_secs: default_development_timeout(),
            publishing_timeout_secs: default_publishing_timeout(),
        }
    }
}

/// Live discovery service, or the static pool in `ideas` when `url` is unset.
#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub ideas: Vec<IdeaSeed>,
}

#[derive(Debug, Deserialize)]
pub struct DevelopmentConfig {
    #[serde(default = "default_development_url")]
    pub url: String,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for DevelopmentConfig {
    fn default() -> Self {
        Self {
            url: default_development_url(),
            workflow: None,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishingConfig {
    #[serde(default = "default_publishing_url")]
    pub url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            url: default_publishing_url(),
            token_env: default_token_env(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_true")]
    pub log: bool,
    #[serde(default)]
    pub telegram_chat_id: Option<String>,
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default)]
    pub telegram_api_base: Option<String>,
    /// Per-notifier delivery bound.
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            log: true,
            telegram_chat_id: None,
            bot_token_env: default_bot_token_env(),
            telegram_api_base: None,
            timeout_secs: default_notify_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SchedulerSection {
    /// `+HH:MM` / `-HH:MM`; schedule times are wall-clock in this offset.
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Collaborator health probe period while looping; `0` disables it.
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            utc_offset: default_utc_offset(),
            tick_secs: default_tick_secs(),
            grace_secs: default_grace_secs(),
            health_interval_secs: default_health_interval(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_max_ideas() -> usize {
    1
}
fn default_retry_limit() -> u32 {
    3
}
fn default_discovery_limit() -> usize {
    10
}
fn default_discovery_timeout() -> u64 {
    60
}
fn default_development_timeout() -> u64 {
    4 * 60 * 60
}
fn default_publishing_timeout() -> u64 {
    300
}
fn default_development_url() -> String {
    "http://localhost:6400".to_string()
}
fn default_poll_interval() -> u64 {
    10
}
fn default_publishing_url() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
fn default_true() -> bool {
    true
}
fn default_utc_offset() -> String {
    "+00:00".to_string()
}
fn default_tick_secs() -> u64 {
    30
}
fn default_grace_secs() -> u64 {
    120
}
fn default_health_interval() -> u64 {
    3600
}
fn default_notify_timeout() -> u64 {
    10
}
fn default_schedule() -> Vec<ScheduleEntry> {
    vec![
        ScheduleEntry::new("daily", "09:00", &[]),
        ScheduleEntry::new("weekday", "10:00", &["mon", "tue", "wed", "thu", "fri"]),
    ]
}

impl IdeaforgeConfig {
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let p = &self.pipeline;
        OrchestratorConfig {
            retry: RetryPolicy::new(p.retry_limit),
            discovery_limit: p.discovery_limit,
            category: p.category,
            visibility: p.visibility,
            discovery_timeout: Duration::from_secs(p.discovery_timeout_secs),
            development_timeout: Duration::from_secs(p.development_timeout_secs),
            publishing_timeout: Duration::from_secs(p.publishing_timeout_secs),
            stale_after: p.stale_after_secs.map(Duration::from_secs),
            resume_backlog: p.resume_backlog,
        }
    }

    pub fn scheduler_config(&self) -> anyhow::Result<SchedulerConfig> {
        Ok(SchedulerConfig {
            max_ideas: self.pipeline.max_ideas,
            utc_offset: parse_utc_offset(&self.scheduler.utc_offset)?,
            grace: chrono::Duration::seconds(self.scheduler.grace_secs.min(86_400) as i64),
            health_interval: (self.scheduler.health_interval_secs > 0)
                .then(|| Duration::from_secs(self.scheduler.health_interval_secs)),
        })
    }

    pub fn discovery_provider(&self) -> Arc<dyn DiscoveryProvider> {
        match &self.discovery.url {
            Some(url) => Arc::new(HttpDiscoveryProvider::new(url.clone())),
            None => {
                if self.discovery.ideas.is_empty() {
                    warn!("No discovery url and no [[discovery.ideas]] configured; runs will find nothing");
                }
                Arc::new(StaticDiscoveryProvider::new(self.discovery.ideas.clone()))
            }
        }
    }

    pub fn development_service(&self) -> HttpDevelopmentService {
        let service = HttpDevelopmentService::new(self.development.url.clone())
            .with_poll_interval(Duration::from_secs(self.development.poll_interval_secs.max(1)));
        match &self.development.workflow {
            Some(workflow) => service.with_workflow(workflow.clone()),
            None => service,
        }
    }

    pub fn publishing_service(&self) -> HttpPublishingService {
        let token = std::env::var(&self.publishing.token_env)
            .ok()
            .filter(|t| !t.is_empty());
        HttpPublishingService::new(self.publishing.url.clone(), token)
    }

    pub fn notifiers(&self) -> NotifierSet {
        let mut set = NotifierSet::new()
            .with_timeout(Duration::from_secs(self.notifier.timeout_secs.max(1)));
        if self.notifier.log {
            set.add(Arc::new(LogNotifier));
        }
        if let Some(chat_id) = &self.notifier.telegram_chat_id {
            match std::env::var(&self.notifier.bot_token_env) {
                Ok(token) if !token.is_empty() => {
                    let mut telegram = TelegramNotifier::new(token, chat_id.clone());
                    if let Some(base) = &self.notifier.telegram_api_base {
                        telegram = telegram.with_api_base(base.clone());
                    }
                    set.add(Arc::new(telegram));
                    info!(chat_id = %chat_id, "Telegram notifications enabled");
                }
                _ => warn!(
                    env = %self.notifier.bot_token_env,
                    "telegram_chat_id set but bot token missing; Telegram notifications disabled"
                ),
            }
        }
        set
    }
}

/// Parse `+HH:MM`, `-HH:MM` or `Z`.
pub fn parse_utc_offset(raw: &str) -> anyhow::Result<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| anyhow::anyhow!("invalid offset"));
    }
    let (sign, rest) = match raw.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => anyhow::bail!("UTC offset '{raw}' must start with + or -"),
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid hours in UTC offset '{raw}'"))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid minutes in UTC offset '{raw}'"))?;
    if minutes >= 60 {
        anyhow::bail!("invalid minutes in UTC offset '{raw}'");
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| anyhow::anyhow!("UTC offset '{raw}' out of range"))
}

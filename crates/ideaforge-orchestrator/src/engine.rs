use crate::health::HealthStatus;
use crate::retry::RetryPolicy;
use chrono::Utc;
use futures_util::TryStreamExt;
use ideaforge_core::{
    Category, FailureCode, Fingerprint, Idea, IdeaOutcome, IdeaforgeError, IdeaforgeResult, ProjectRecord,
    ProjectStatus, RunReport, ServiceFailure,
};
use ideaforge_services::{
    DevelopmentRequest, DevelopmentService, DiscoveryProvider, DiscoveryRequest, NotifierSet,
    PipelineEvent, PublishRequest, PublishingService, Visibility,
};
use ideaforge_store::HistoryStore;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Tunables of a pipeline run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Attempt budget per idea across runs.
    pub retry: RetryPolicy,
    /// How many ideas to ask the discovery provider for.
    pub discovery_limit: usize,
    /// Restrict discovery to one category.
    pub category: Option<Category>,
    /// Visibility of published repositories.
    pub visibility: Visibility,
    /// Bound on fetching the whole discovery batch.
    pub discovery_timeout: Duration,
    /// Bound on one development session.
    pub development_timeout: Duration,
    /// Bound on one publish call.
    pub publishing_timeout: Duration,
    /// Reclaim DEVELOPING/PUBLISHING records untouched for this long.
    /// `None` leaves in-flight records alone forever.
    pub stale_after: Option<Duration>,
    /// Merge PENDING/DEVELOPED records that were not rediscovered.
    pub resume_backlog: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            discovery_limit: 10,
            category: None,
            visibility: Visibility::Public,
            discovery_timeout: Duration::from_secs(60),
            development_timeout: Duration::from_secs(2 * 60 * 60),
            publishing_timeout: Duration::from_secs(5 * 60),
            stale_after: None,
            resume_backlog: false,
        }
    }
}

/// Drives ideas through discovery → development → publishing.
///
/// Every status change is persisted to the [`HistoryStore`] before the next
/// external call, so a crashed run is resumed from its last checkpoint by
/// the next one. Per-idea failures are recorded and never abort the run;
/// only persistence errors are returned as `Err`.
pub struct Orchestrator {
    store: Arc<dyn HistoryStore>,
    discovery: Arc<dyn DiscoveryProvider>,
    development: Arc<dyn DevelopmentService>,
    publishing: Arc<dyn PublishingService>,
    notifiers: NotifierSet,
    config: OrchestratorConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    /// Orchestrator with default config, no notifiers and no shutdown signal.
    pub fn new(
        store: Arc<dyn HistoryStore>,
        discovery: Arc<dyn DiscoveryProvider>,
        development: Arc<dyn DevelopmentService>,
        publishing: Arc<dyn PublishingService>,
    ) -> Self {
        Self {
            store,
            discovery,
            development,
            publishing,
            notifiers: NotifierSet::new(),
            config: OrchestratorConfig::default(),
            shutdown: None,
        }
    }

    /// Replace the run tunables.
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the notifier set.
    pub fn with_notifiers(mut self, notifiers: NotifierSet) -> Self {
        self.notifiers = notifiers;
        self
    }

    /// Observe a shutdown flag. Checked between ideas and before each
    /// external call; calls already in flight run to completion or timeout.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Current run tunables.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The history store runs write to.
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// Probe the development service and the publishing credentials.
    ///
    /// The development probe is bounded by the discovery timeout and counts
    /// as unhealthy when it expires.
    pub async fn health_check(&self) -> HealthStatus {
        let development_healthy =
            tokio::time::timeout(self.config.discovery_timeout, self.development.health_check())
                .await
                .unwrap_or(false);
        HealthStatus {
            checked_at: Utc::now(),
            development_healthy,
            publishing_configured: self.publishing.is_configured(),
        }
    }

    /// Execute one run, stopping after `max_ideas` ideas were published.
    pub async fn run(&self, max_ideas: usize) -> IdeaforgeResult<RunReport> {
        let mut report = RunReport::empty();
        if max_ideas == 0 {
            info!(run_id = %report.run_id, "Orchestrator: max_ideas is 0, nothing to do");
            report.finish();
            return Ok(report);
        }

        info!(
            run_id = %report.run_id,
            max_ideas,
            provider = self.discovery.name(),
            "Orchestrator: starting run"
        );

        let mut ideas = match self.discover().await {
            Ok(ideas) => ideas,
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Orchestrator: discovery failed, run aborted");
                report.discovery_error = Some(e.to_string());
                report.finish();
                self.notifiers
                    .broadcast(&PipelineEvent::RunFinished {
                        summary: report.summary(),
                    })
                    .await;
                return Ok(report);
            }
        };

        if self.config.resume_backlog {
            let merged = self.merge_backlog(&mut ideas).await?;
            if merged > 0 {
                info!(merged, "Orchestrator: backlog records merged into candidates");
            }
        }

        let candidates = rank_candidates(ideas);
        report.discovered = candidates.len();
        debug!(candidates = candidates.len(), "Orchestrator: candidates ranked");

        for idea in candidates {
            if report.published >= max_ideas {
                break;
            }
            if self.shutdown_requested() {
                warn!(run_id = %report.run_id, "Orchestrator: shutdown requested, stopping between ideas");
                report.interrupted = true;
                break;
            }
            self.process(idea, &mut report).await?;
            if report.interrupted {
                break;
            }
        }

        report.finish();
        info!(
            run_id = %report.run_id,
            published = report.published,
            failed = report.failed,
            retry_scheduled = report.retry_scheduled,
            skipped = report.skipped,
            interrupted = report.interrupted,
            "Orchestrator: run finished"
        );
        if report.processed() > 0 {
            self.notifiers
                .broadcast(&PipelineEvent::RunFinished {
                    summary: report.summary(),
                })
                .await;
        }
        Ok(report)
    }

    /// Fetch the full candidate list. Every failure mode becomes
    /// [`IdeaforgeError::DiscoveryUnavailable`].
    async fn discover(&self) -> IdeaforgeResult<Vec<Idea>> {
        let request = DiscoveryRequest::new(self.config.discovery_limit)
            .with_category(self.config.category);
        let fetch = async {
            let stream = self.discovery.discover(&request).await?;
            stream.try_collect::<Vec<Idea>>().await
        };

        match tokio::time::timeout(self.config.discovery_timeout, fetch).await {
            Ok(Ok(ideas)) => {
                info!(count = ideas.len(), "Orchestrator: ideas discovered");
                Ok(ideas)
            }
            Ok(Err(IdeaforgeError::DiscoveryUnavailable(reason))) => {
                Err(IdeaforgeError::DiscoveryUnavailable(reason))
            }
            Ok(Err(other)) => Err(IdeaforgeError::DiscoveryUnavailable(other.to_string())),
            Err(_) => Err(IdeaforgeError::DiscoveryUnavailable(format!(
                "no response within {}s",
                self.config.discovery_timeout.as_secs()
            ))),
        }
    }

    async fn merge_backlog(&self, ideas: &mut Vec<Idea>) -> IdeaforgeResult<usize> {
        let known: HashSet<Fingerprint> = ideas.iter().map(Idea::fingerprint).collect();
        let mut merged = 0;
        for status in [ProjectStatus::Pending, ProjectStatus::Developed] {
            for record in self.store.list(Some(status)).await? {
                if !known.contains(&record.fingerprint) {
                    ideas.push(record.idea);
                    merged += 1;
                }
            }
        }
        Ok(merged)
    }

    async fn process(&self, idea: Idea, report: &mut RunReport) -> IdeaforgeResult<()> {
        let fingerprint = idea.fingerprint();
        let mut record = match self.store.get(&fingerprint).await? {
            Some(existing) => existing,
            None => {
                let record = ProjectRecord::new(idea);
                self.store.upsert(&record).await?;
                info!(fingerprint = %fingerprint, title = %record.idea.title, "Orchestrator: new idea recorded");
                record
            }
        };

        if record.status.is_in_flight() {
            if !self.is_stale(&record) {
                debug!(fingerprint = %fingerprint, status = %record.status, "Orchestrator: skipping idea with a call in flight");
                report.skipped += 1;
                return Ok(());
            }
            self.reclaim(&mut record).await?;
            if record.status == ProjectStatus::Failed {
                report.record(outcome(&record));
                return Ok(());
            }
        }

        let mut developed_now = false;
        match record.status {
            ProjectStatus::Pending => {
                if self.shutdown_requested() {
                    report.interrupted = true;
                    return Ok(());
                }
                if !self.develop(&mut record).await? {
                    report.record(outcome(&record));
                    return Ok(());
                }
                developed_now = true;
            }
            ProjectStatus::Developed => {
                info!(fingerprint = %fingerprint, "Orchestrator: resuming from developed artifacts");
            }
            _ => {
                debug!(fingerprint = %fingerprint, status = %record.status, "Orchestrator: skipping settled idea");
                report.skipped += 1;
                return Ok(());
            }
        }

        if self.shutdown_requested() {
            report.interrupted = true;
            if developed_now {
                report.record(outcome(&record));
            }
            return Ok(());
        }

        self.publish(&mut record).await?;
        report.record(outcome(&record));
        Ok(())
    }

    /// PENDING → DEVELOPING → DEVELOPED. Returns whether artifacts exist now.
    async fn develop(&self, record: &mut ProjectRecord) -> IdeaforgeResult<bool> {
        record.transition(ProjectStatus::Developing)?;
        self.store.upsert(record).await?;
        info!(
            fingerprint = %record.fingerprint,
            title = %record.idea.title,
            attempt = record.attempt_count + 1,
            "Orchestrator: development started"
        );

        let request = DevelopmentRequest::for_idea(&record.idea);
        let result = with_timeout(
            self.config.development_timeout,
            self.development.develop(&request),
        )
        .await;

        match result {
            Ok(artifact) => {
                record.transition(ProjectStatus::Developed)?;
                record.artifact = Some(artifact);
                record.attempt_count = 0;
                record.last_error = None;
                self.store.upsert(record).await?;
                info!(fingerprint = %record.fingerprint, "Orchestrator: development finished");
                Ok(true)
            }
            Err(failure) => {
                let error = IdeaforgeError::DevelopmentFailed(failure).to_string();
                self.record_failure(record, ProjectStatus::Pending, error)
                    .await?;
                Ok(false)
            }
        }
    }

    /// DEVELOPED → PUBLISHING → PUBLISHED.
    async fn publish(&self, record: &mut ProjectRecord) -> IdeaforgeResult<()> {
        record.transition(ProjectStatus::Publishing)?;
        self.store.upsert(record).await?;

        let Some(artifact) = record.artifact.clone() else {
            let error = IdeaforgeError::PublishingFailed(ServiceFailure::new(
                FailureCode::Malformed,
                "record has no artifact reference",
            ))
            .to_string();
            return self
                .record_failure(record, ProjectStatus::Developed, error)
                .await;
        };

        let request = PublishRequest {
            name: record.idea.project_name(),
            artifact,
            visibility: self.config.visibility,
            description: record.idea.description.clone(),
        };
        info!(fingerprint = %record.fingerprint, name = %request.name, "Orchestrator: publishing started");

        let result = with_timeout(
            self.config.publishing_timeout,
            self.publishing.publish(&request),
        )
        .await;

        match result {
            Ok(handle) => {
                record.transition(ProjectStatus::Published)?;
                record.repo_url = Some(handle.url.clone());
                record.last_error = None;
                self.store.upsert(record).await?;
                info!(fingerprint = %record.fingerprint, url = %handle.url, "Orchestrator: published");
                self.notifiers
                    .broadcast(&PipelineEvent::Published {
                        fingerprint: record.fingerprint.clone(),
                        title: record.idea.title.clone(),
                        repo_url: handle.url,
                    })
                    .await;
                Ok(())
            }
            Err(failure) => {
                let error = IdeaforgeError::PublishingFailed(failure).to_string();
                self.record_failure(record, ProjectStatus::Developed, error)
                    .await
            }
        }
    }

    /// Count a failed attempt: back to `retry_to`, or FAILED once the
    /// retry budget is spent.
    async fn record_failure(
        &self,
        record: &mut ProjectRecord,
        retry_to: ProjectStatus,
        error: String,
    ) -> IdeaforgeResult<()> {
        let attempts = record.attempt_count + 1;
        let retry = self.config.retry.should_retry(attempts);
        record.transition(if retry { retry_to } else { ProjectStatus::Failed })?;
        record.attempt_count = attempts;
        record.last_error = Some(error.clone());
        self.store.upsert(record).await?;

        if retry {
            warn!(
                fingerprint = %record.fingerprint,
                attempts,
                remaining = self.config.retry.remaining(attempts),
                status = %record.status,
                error = %error,
                "Orchestrator: attempt failed, retry left for a later run"
            );
        } else {
            error!(
                fingerprint = %record.fingerprint,
                attempts,
                error = %error,
                "Orchestrator: retry limit reached, idea failed"
            );
            self.notifiers
                .broadcast(&PipelineEvent::Failed {
                    fingerprint: record.fingerprint.clone(),
                    title: record.idea.title.clone(),
                    error,
                })
                .await;
        }
        Ok(())
    }

    fn is_stale(&self, record: &ProjectRecord) -> bool {
        self.config.stale_after.is_some_and(|after| {
            record
                .idle_for(Utc::now())
                .to_std()
                .is_ok_and(|idle| idle >= after)
        })
    }

    /// An in-flight record nobody owns any more counts as a failed attempt.
    async fn reclaim(&self, record: &mut ProjectRecord) -> IdeaforgeResult<()> {
        let back_to = match record.status {
            ProjectStatus::Developing => ProjectStatus::Pending,
            _ => ProjectStatus::Developed,
        };
        warn!(
            fingerprint = %record.fingerprint,
            status = %record.status,
            since = %record.updated_at,
            "Orchestrator: reclaiming abandoned in-flight record"
        );
        let error = format!(
            "{} abandoned since {}",
            record.status,
            record.updated_at.to_rfc3339()
        );
        self.record_failure(record, back_to, error).await
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Sort by score descending (earlier discovery wins ties) and keep only the
/// first idea per fingerprint.
pub fn rank_candidates(mut ideas: Vec<Idea>) -> Vec<Idea> {
    // Non-finite scores rank last.
    let key = |idea: &Idea| {
        if idea.score.is_finite() {
            idea.score
        } else {
            f64::NEG_INFINITY
        }
    };
    ideas.sort_by(|a, b| {
        key(b)
            .total_cmp(&key(a))
            .then_with(|| a.discovered_at.cmp(&b.discovered_at))
    });
    let mut seen = HashSet::new();
    ideas.retain(|idea| seen.insert(idea.fingerprint()));
    ideas
}

async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, ServiceFailure>
where
    F: Future<Output = Result<T, ServiceFailure>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(ServiceFailure::timeout(limit)),
    }
}

fn outcome(record: &ProjectRecord) -> IdeaOutcome {
    IdeaOutcome {
        fingerprint: record.fingerprint.clone(),
        title: record.idea.title.clone(),
        status: record.status,
        repo_url: record.repo_url.clone(),
        error: record.last_error.clone(),
    }
}

//! Deterministic collaborators shared by the orchestrator integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use ideaforge_core::{
    ArtifactRef, Category, FailureCode, Fingerprint, IdeaforgeError, IdeaforgeResult,
    ProjectRecord, ProjectStatus, ScheduleState, ServiceFailure,
};
use ideaforge_orchestrator::{Orchestrator, OrchestratorConfig};
use ideaforge_services::{
    DevelopmentRequest, DevelopmentService, DiscoveryProvider, DiscoveryRequest, IdeaSeed,
    IdeaStream, Notifier, NotifierSet, PipelineEvent, PublishRequest, PublishingService,
    RepoHandle, StaticDiscoveryProvider,
};
use ideaforge_store::{HistoryStore, InMemoryHistoryStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub fn seed(title: &str, score: f64) -> IdeaSeed {
    IdeaSeed {
        title: title.into(),
        source: "manual".into(),
        category: Category::CliApp,
        score,
        description: Some(format!("Build {title}")),
        reference_url: None,
    }
}

pub fn fingerprint(title: &str) -> Fingerprint {
    Fingerprint::compute(title, "manual")
}

pub fn discovery(seeds: Vec<IdeaSeed>) -> Arc<StaticDiscoveryProvider> {
    Arc::new(StaticDiscoveryProvider::new(seeds))
}

// ---------------------------------------------------------------------------
// Discovery that is down
// ---------------------------------------------------------------------------

pub struct DownDiscovery;

#[async_trait]
impl DiscoveryProvider for DownDiscovery {
    fn name(&self) -> &str {
        "down"
    }

    async fn discover(&self, _request: &DiscoveryRequest) -> IdeaforgeResult<IdeaStream> {
        Err(IdeaforgeError::DiscoveryUnavailable("connection refused".into()))
    }
}

// ---------------------------------------------------------------------------
// Development mock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockDevelopment {
    pub calls: AtomicUsize,
    pub titles: Mutex<Vec<String>>,
    /// Fail this many calls before succeeding.
    pub fail_first: AtomicUsize,
    pub always_fail: AtomicBool,
    pub delay: Option<Duration>,
    /// When set, each call signals `started` and waits for `release`.
    pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
    pub unhealthy: AtomicBool,
    pub health_checks: AtomicUsize,
}

impl MockDevelopment {
    pub fn failing() -> Self {
        let dev = Self::default();
        dev.always_fail.store(true, Ordering::SeqCst);
        dev
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn gated(started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((started, release)),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn titles(&self) -> Vec<String> {
        self.titles.lock().unwrap().clone()
    }
}

#[async_trait]
impl DevelopmentService for MockDevelopment {
    async fn develop(&self, request: &DevelopmentRequest) -> Result<ArtifactRef, ServiceFailure> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.titles.lock().unwrap().push(request.title.clone());

        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ServiceFailure::new(FailureCode::Internal, "build broke"));
        }
        if n < self.fail_first.load(Ordering::SeqCst) {
            return Err(ServiceFailure::new(FailureCode::Transport, "flaky"));
        }
        Ok(ArtifactRef::new(format!("artifacts/{}", request.title)))
    }

    async fn health_check(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        !self.unhealthy.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Publishing mock
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockPublishing {
    pub calls: AtomicUsize,
    pub always_fail: AtomicBool,
    pub names: Mutex<Vec<String>>,
    pub unconfigured: AtomicBool,
}

impl MockPublishing {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublishingService for MockPublishing {
    async fn publish(&self, request: &PublishRequest) -> Result<RepoHandle, ServiceFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.names.lock().unwrap().push(request.name.clone());
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(ServiceFailure::new(FailureCode::NameCollision, "already exists"));
        }
        Ok(RepoHandle {
            url: format!("https://git.example.com/forge/{}", request.name),
            name: request.name.clone(),
        })
    }

    fn is_configured(&self) -> bool {
        !self.unconfigured.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    pub events: Mutex<Vec<PipelineEvent>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, event: &PipelineEvent) -> IdeaforgeResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Never answers, like a chat API that accepted the connection and stalled.
pub struct StalledNotifier;

#[async_trait]
impl Notifier for StalledNotifier {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn notify(&self, _event: &PipelineEvent) -> IdeaforgeResult<()> {
        std::future::pending().await
    }
}

// ---------------------------------------------------------------------------
// Store that can be told to fail writes of one status (simulated crash)
// ---------------------------------------------------------------------------

pub struct CrashingStore {
    pub inner: InMemoryHistoryStore,
    pub fail_on: Mutex<Option<ProjectStatus>>,
}

impl CrashingStore {
    pub fn failing_on(status: ProjectStatus) -> Self {
        Self {
            inner: InMemoryHistoryStore::new(),
            fail_on: Mutex::new(Some(status)),
        }
    }

    pub fn heal(&self) {
        *self.fail_on.lock().unwrap() = None;
    }
}

#[async_trait]
impl HistoryStore for CrashingStore {
    async fn get(&self, fingerprint: &Fingerprint) -> IdeaforgeResult<Option<ProjectRecord>> {
        self.inner.get(fingerprint).await
    }

    async fn upsert(&self, record: &ProjectRecord) -> IdeaforgeResult<()> {
        let fail_on = *self.fail_on.lock().unwrap();
        if fail_on == Some(record.status) {
            return Err(IdeaforgeError::Persistence("disk went away".into()));
        }
        self.inner.upsert(record).await
    }

    async fn list(&self, status: Option<ProjectStatus>) -> IdeaforgeResult<Vec<ProjectRecord>> {
        self.inner.list(status).await
    }

    async fn load_schedule(&self) -> IdeaforgeResult<ScheduleState> {
        self.inner.load_schedule().await
    }

    async fn save_schedule(&self, state: &ScheduleState) -> IdeaforgeResult<()> {
        self.inner.save_schedule(state).await
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<dyn HistoryStore>,
    pub development: Arc<MockDevelopment>,
    pub publishing: Arc<MockPublishing>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestrator: Orchestrator,
}

pub fn harness(
    store: Arc<dyn HistoryStore>,
    discovery: Arc<dyn DiscoveryProvider>,
    development: MockDevelopment,
    config: OrchestratorConfig,
) -> Harness {
    let development = Arc::new(development);
    let publishing = Arc::new(MockPublishing::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Orchestrator::new(
        store.clone(),
        discovery,
        development.clone(),
        publishing.clone(),
    )
    .with_config(config)
    .with_notifiers(NotifierSet::new().with(notifier.clone()));
    Harness {
        store,
        development,
        publishing,
        notifier,
        orchestrator,
    }
}

pub fn memory_store() -> Arc<dyn HistoryStore> {
    Arc::new(InMemoryHistoryStore::new())
}

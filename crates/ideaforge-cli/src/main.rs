mod config;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::IdeaforgeConfig;
use futures_util::TryStreamExt;
use ideaforge_core::{Category, Fingerprint, Idea, ProjectStatus, RunReport};
use ideaforge_orchestrator::{requeue, Orchestrator, Scheduler, TickOutcome};
use ideaforge_services::{
    DevelopmentService, DiscoveryProvider, DiscoveryRequest, IdeaSeed, PublishingService,
    StaticDiscoveryProvider,
};
use ideaforge_store::{FileHistoryStore, HistoryStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ideaforge", about = "Ideaforge — discover, develop and publish software projects")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ideaforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once
    Run {
        /// Stop after this many ideas were published (overrides config)
        #[arg(short, long)]
        max_ideas: Option<usize>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push one manually described idea through the pipeline
    Develop {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value = "cli_app")]
        category: Category,
    },
    /// Run the scheduler in the foreground
    Schedule {
        /// Evaluate a single tick and exit
        #[arg(long, conflicts_with = "force")]
        once: bool,
        /// Start a run now, ignoring the timetable (still refuses to overlap)
        #[arg(long)]
        force: bool,
    },
    /// List project records
    Status {
        /// Only records in this status
        #[arg(short, long)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        json: bool,
    },
    /// Return a FAILED record to the pipeline
    Requeue { fingerprint: String },
    /// Show what the discovery provider offers right now
    Discover {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Check collaborators and credentials
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            warn!(error = %e, "Failed to load .env");
        }
    }

    let cli = Cli::parse();
    let config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Run { max_ideas, json } => {
            let store = open_store(&config).await?;
            let orchestrator = build_orchestrator(
                &config,
                store,
                config.discovery_provider(),
                shutdown_signal(),
            );
            let report = orchestrator
                .run(max_ideas.unwrap_or(config.pipeline.max_ideas))
                .await?;
            print_report(&report, json)?;
            if let Some(err) = &report.discovery_error {
                anyhow::bail!("discovery unavailable: {err}");
            }
        }
        Commands::Develop {
            title,
            description,
            category,
        } => {
            let store = open_store(&config).await?;
            let seed = IdeaSeed {
                title,
                source: "manual".to_string(),
                category,
                score: 0.0,
                description,
                reference_url: None,
            };
            let orchestrator = build_orchestrator(
                &config,
                store,
                Arc::new(StaticDiscoveryProvider::new(vec![seed])),
                shutdown_signal(),
            );
            let report = orchestrator.run(1).await?;
            print_report(&report, false)?;
        }
        Commands::Schedule { once, force } => {
            let store = open_store(&config).await?;
            let shutdown = shutdown_signal();
            let orchestrator = Arc::new(build_orchestrator(
                &config,
                store.clone(),
                config.discovery_provider(),
                shutdown.clone(),
            ));
            let scheduler = Scheduler::new(
                config.schedule.clone(),
                orchestrator,
                store,
                config.scheduler_config()?,
            )
            .await?;

            if once || force {
                let outcome = if force {
                    scheduler.trigger(Utc::now()).await?
                } else {
                    scheduler.tick(Utc::now()).await?
                };
                match outcome {
                    TickOutcome::Ran(report) => print_report(&report, false)?,
                    TickOutcome::Busy => println!("A run is already in progress."),
                    TickOutcome::NotDue => match scheduler.next_fire_time(Utc::now()) {
                        Some(next) => println!("No slot due. Next slot: {next}"),
                        None => println!("No slot due and no schedule entries configured."),
                    },
                }
            } else {
                info!(
                    entries = scheduler.entry_count(),
                    utc_offset = %config.scheduler.utc_offset,
                    "Starting scheduler"
                );
                scheduler
                    .run_until_shutdown(
                        Duration::from_secs(config.scheduler.tick_secs.max(1)),
                        shutdown,
                    )
                    .await?;
            }
        }
        Commands::Status { status, json } => {
            let store = open_store(&config).await?;
            let records = store.list(status).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No project records.");
            } else {
                for record in &records {
                    println!(
                        "{}  {:<10}  attempts={}  {}",
                        record.fingerprint,
                        record.status.as_str(),
                        record.attempt_count,
                        record.idea.title
                    );
                    if let Some(url) = &record.repo_url {
                        println!("    {url}");
                    }
                    if let Some(err) = &record.last_error {
                        println!("    last error: {err}");
                    }
                }
                println!("\nTotal: {} record(s)", records.len());
                let schedule = store.load_schedule().await?;
                if let Some(last) = schedule.last_run_at {
                    println!("Last scheduled run: {last}");
                }
            }
        }
        Commands::Requeue { fingerprint } => {
            let fingerprint = Fingerprint::parse(&fingerprint)?;
            let store = open_store(&config).await?;
            let record = requeue(store.as_ref(), &fingerprint).await?;
            println!(
                "{} re-queued as {} ({})",
                record.fingerprint, record.status, record.idea.title
            );
        }
        Commands::Discover { limit } => {
            let store = open_store(&config).await?;
            let provider = config.discovery_provider();
            let request = DiscoveryRequest::new(limit).with_category(config.pipeline.category);
            let ideas: Vec<Idea> = provider.discover(&request).await?.try_collect().await?;
            if ideas.is_empty() {
                println!("No ideas offered by the '{}' provider.", provider.name());
            }
            for (i, idea) in ideas.iter().enumerate() {
                let fingerprint = idea.fingerprint();
                let known = match store.get(&fingerprint).await? {
                    Some(record) => record.status.to_string(),
                    None => "new".to_string(),
                };
                println!("{}. {} [{}]", i + 1, idea.title, known);
                println!(
                    "   {}  category={}  source={}  score={:.1}",
                    fingerprint, idea.category, idea.source, idea.score
                );
                if let Some(description) = &idea.description {
                    println!("   {description}");
                }
            }
        }
        Commands::Check => {
            let mut issues = Vec::new();

            match FileHistoryStore::new(config.data_dir.clone()).await {
                Ok(_) => println!("  data dir: {} ok", config.data_dir.display()),
                Err(e) => {
                    println!("  data dir: {} unusable ({e})", config.data_dir.display());
                    issues.push("data_dir");
                }
            }

            if config.development_service().health_check().await {
                println!("  development service: {} healthy", config.development.url);
            } else {
                println!("  development service: {} not reachable", config.development.url);
                issues.push("development");
            }

            if config.publishing_service().is_configured() {
                println!("  publishing token: {} set", config.publishing.token_env);
            } else {
                println!("  publishing token: {} not set", config.publishing.token_env);
                issues.push("publishing");
            }

            match &config.discovery.url {
                Some(url) => println!("  discovery: {url}"),
                None => println!(
                    "  discovery: static pool of {} idea(s)",
                    config.discovery.ideas.len()
                ),
            }

            if !issues.is_empty() {
                anyhow::bail!("environment check failed: {}", issues.join(", "));
            }
            println!("\nAll checks passed.");
        }
    }

    Ok(())
}

async fn load_config(path: &std::path::Path) -> anyhow::Result<IdeaforgeConfig> {
    let config_str = match tokio::fs::read_to_string(path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Config file not found, using defaults");
            String::new()
        }
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        }
    };
    Ok(toml::from_str(&config_str)?)
}

async fn open_store(config: &IdeaforgeConfig) -> anyhow::Result<Arc<dyn HistoryStore>> {
    let store = FileHistoryStore::new(config.data_dir.clone()).await?;
    Ok(Arc::new(store))
}

fn build_orchestrator(
    config: &IdeaforgeConfig,
    store: Arc<dyn HistoryStore>,
    discovery: Arc<dyn DiscoveryProvider>,
    shutdown: watch::Receiver<bool>,
) -> Orchestrator {
    let publishing = config.publishing_service();
    if !publishing.is_configured() {
        warn!(env = %config.publishing.token_env, "Publishing token not set; publishing will fail");
    }
    Orchestrator::new(
        store,
        discovery,
        Arc::new(config.development_service()),
        Arc::new(publishing),
    )
    .with_config(config.orchestrator_config())
    .with_notifiers(config.notifiers())
    .with_shutdown(shutdown)
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested, finishing at the next checkpoint");
                let _ = tx.send(true);
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for Ctrl-C");
                // Keep the sender alive so receivers never see a closed channel.
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

fn print_report(report: &RunReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!("{}", report.summary());
    for outcome in &report.outcomes {
        let detail = outcome
            .repo_url
            .as_deref()
            .or(outcome.error.as_deref())
            .unwrap_or("");
        println!(
            "  {}  {:<10}  {}  {}",
            outcome.fingerprint,
            outcome.status.as_str(),
            outcome.title,
            detail
        );
    }
    Ok(())
}

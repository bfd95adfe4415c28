use crate::engine::Orchestrator;
use crate::health::HealthStatus;
use chrono::{DateTime, FixedOffset, Offset, Utc, Weekday};
use cron::Schedule;
use ideaforge_core::{IdeaforgeError, IdeaforgeResult, RunReport, ScheduleState, SchedulerPhase};
use ideaforge_store::HistoryStore;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// A weekly wall-clock slot, e.g. `09:00` on `["mon", "thu"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Label used in logs.
    pub name: String,
    /// `HH:MM`, 24-hour, in the scheduler's UTC offset.
    pub time: String,
    /// Weekday names (`mon`, `Tuesday`, ...). Empty means every day.
    #[serde(default)]
    pub weekdays: Vec<String>,
}

impl ScheduleEntry {
    /// Entry firing at `time` on `weekdays` (every day when empty).
    pub fn new(name: impl Into<String>, time: impl Into<String>, weekdays: &[&str]) -> Self {
        Self {
            name: name.into(),
            time: time.into(),
            weekdays: weekdays.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// The 7-field cron expression (sec min hour dom month dow year) of this entry.
    pub fn cron_expression(&self) -> IdeaforgeResult<String> {
        let invalid = || {
            IdeaforgeError::Config(format!(
                "Schedule '{}': invalid time '{}', expected HH:MM",
                self.name, self.time
            ))
        };
        let (hour, minute) = self.time.split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.trim().parse().map_err(|_| invalid())?;
        let minute: u32 = minute.trim().parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        let days = if self.weekdays.is_empty() {
            "*".to_string()
        } else {
            self.weekdays
                .iter()
                .map(|d| {
                    Weekday::from_str(d.trim())
                        .map(|w| w.to_string())
                        .map_err(|_| {
                            IdeaforgeError::Config(format!(
                                "Schedule '{}': unknown weekday '{d}'",
                                self.name
                            ))
                        })
                })
                .collect::<IdeaforgeResult<Vec<_>>>()?
                .join(",")
        };
        Ok(format!("0 {minute} {hour} * * {days} *"))
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Passed to [`Orchestrator::run`].
    pub max_ideas: usize,
    /// Offset the entries' wall-clock times are evaluated in.
    pub utc_offset: FixedOffset,
    /// How late a tick may be and still fire a slot.
    pub grace: chrono::Duration,
    /// Probe collaborator health this often while looping. `None` disables it.
    pub health_interval: Option<Duration>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_ideas: 1,
            utc_offset: Utc.fix(),
            grace: chrono::Duration::seconds(120),
            health_interval: None,
        }
    }
}

/// Result of one scheduler tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// A run was already in progress; the tick was dropped.
    Busy,
    /// No slot fell due.
    NotDue,
    /// A run happened.
    Ran(RunReport),
}

struct CompiledEntry {
    entry: ScheduleEntry,
    schedule: Schedule,
}

/// Fires the orchestrator on a weekly timetable, never more than one run at
/// a time.
///
/// The IDLE/RUNNING guard and the last fired slot live in a [`ScheduleState`]
/// persisted through the [`HistoryStore`], so a restarted process neither
/// fires a slot twice nor stays locked by a run that died with it.
pub struct Scheduler {
    entries: Vec<CompiledEntry>,
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn HistoryStore>,
    state: Mutex<ScheduleState>,
    config: SchedulerConfig,
}

impl Scheduler {
    /// Compile `entries` and load the persisted state.
    ///
    /// A RUNNING phase found on disk belongs to a process that is gone; it
    /// is reset to IDLE.
    pub async fn new(
        entries: Vec<ScheduleEntry>,
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn HistoryStore>,
        config: SchedulerConfig,
    ) -> IdeaforgeResult<Self> {
        let entries = entries
            .into_iter()
            .map(|entry| {
                let schedule = Self::parse_cron(&entry.cron_expression()?)?;
                Ok(CompiledEntry { entry, schedule })
            })
            .collect::<IdeaforgeResult<Vec<_>>>()?;

        let mut state = store.load_schedule().await?;
        if state.is_running() {
            warn!(
                last_slot = ?state.last_slot,
                "Scheduler: found RUNNING state from a previous process, resetting to IDLE"
            );
            state.phase = SchedulerPhase::Idle;
            store.save_schedule(&state).await?;
        }

        Ok(Self {
            entries,
            orchestrator,
            store,
            state: Mutex::new(state),
            config,
        })
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    ///
    /// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
    pub fn parse_cron(cron_expr: &str) -> IdeaforgeResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            IdeaforgeError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// Number of compiled schedule entries.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> ScheduleState {
        self.state.lock().await.clone()
    }

    /// Earliest slot of any entry strictly after `after`.
    pub fn next_fire_time(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.config.utc_offset);
        self.entries
            .iter()
            .filter_map(|c| c.schedule.after(&local).next())
            .min()
            .map(|slot| slot.with_timezone(&Utc))
    }

    /// Latest slot in `(now - grace, now]` that has not fired yet.
    pub fn due_slot(&self, now: DateTime<Utc>, state: &ScheduleState) -> Option<DateTime<Utc>> {
        let local_now = now.with_timezone(&self.config.utc_offset);
        let window_start = local_now - self.config.grace;
        self.entries
            .iter()
            .filter_map(|c| {
                let slot = c.schedule.after(&window_start).next()?;
                (slot <= local_now).then(|| {
                    debug!(entry = %c.entry.name, slot = %slot, "Scheduler: slot in window");
                    slot.with_timezone(&Utc)
                })
            })
            .filter(|slot| state.slot_pending(*slot))
            .max()
    }

    /// Fire the orchestrator if a slot is due and no run is in progress.
    pub async fn tick(&self, now: DateTime<Utc>) -> IdeaforgeResult<TickOutcome> {
        {
            let mut state = self.state.lock().await;
            if state.is_running() {
                debug!("Scheduler: run in progress, tick dropped");
                return Ok(TickOutcome::Busy);
            }
            let Some(slot) = self.due_slot(now, &state) else {
                return Ok(TickOutcome::NotDue);
            };
            let mut next = state.clone();
            next.phase = SchedulerPhase::Running;
            next.last_slot = Some(slot);
            self.store.save_schedule(&next).await?;
            *state = next;
            info!(slot = %slot, "Scheduler: slot due, starting run");
        }
        self.execute(now).await
    }

    /// Start a run now, outside the timetable. Still refuses to overlap.
    pub async fn trigger(&self, now: DateTime<Utc>) -> IdeaforgeResult<TickOutcome> {
        {
            let mut state = self.state.lock().await;
            if state.is_running() {
                warn!("Scheduler: run in progress, forced run refused");
                return Ok(TickOutcome::Busy);
            }
            let mut next = state.clone();
            next.phase = SchedulerPhase::Running;
            self.store.save_schedule(&next).await?;
            *state = next;
            info!(at = %now, "Scheduler: forced run");
        }
        self.execute(now).await
    }

    async fn execute(&self, now: DateTime<Utc>) -> IdeaforgeResult<TickOutcome> {
        let result = self.orchestrator.run(self.config.max_ideas).await;

        let idle = {
            let mut state = self.state.lock().await;
            state.phase = SchedulerPhase::Idle;
            state.last_run_at = Some(now);
            state.clone()
        };
        self.store.save_schedule(&idle).await?;

        match result {
            Ok(report) => {
                info!(run_id = %report.run_id, "Scheduler: {}", report.summary());
                Ok(TickOutcome::Ran(report))
            }
            Err(e) => {
                error!(error = %e, "Scheduler: run aborted");
                Err(e)
            }
        }
    }

    /// Probe the collaborators and log the result. Never touches the
    /// schedule state, so it runs regardless of the IDLE/RUNNING phase.
    pub async fn health_check(&self) -> HealthStatus {
        let status = self.orchestrator.health_check().await;
        if status.is_healthy() {
            info!(checked_at = %status.checked_at, "Scheduler: health check passed");
        } else {
            warn!(
                checked_at = %status.checked_at,
                development_healthy = status.development_healthy,
                publishing_configured = status.publishing_configured,
                problems = ?status.problems(),
                "Scheduler: health check failed"
            );
        }
        status
    }

    /// Tick every `interval` until `shutdown` flips to `true`, probing
    /// collaborator health every `health_interval` when configured.
    ///
    /// A run in progress when shutdown arrives is awaited; the orchestrator
    /// observes the same signal and stops at its next checkpoint. Health
    /// probes wait while a run is in progress.
    pub async fn run_until_shutdown(
        &self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> IdeaforgeResult<()> {
        info!(
            entries = self.entries.len(),
            next = ?self.next_fire_time(Utc::now()),
            "Scheduler: started"
        );
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut health = self.config.health_interval.map(|every| {
            let mut probe = tokio::time::interval(every);
            probe.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            probe
        });

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await? {
                        TickOutcome::Ran(_) => {
                            info!(next = ?self.next_fire_time(Utc::now()), "Scheduler: waiting for next slot");
                        }
                        TickOutcome::Busy | TickOutcome::NotDue => {}
                    }
                }
                () = next_probe(&mut health) => {
                    self.health_check().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Scheduler: shutdown requested, stopped");
        Ok(())
    }
}

/// Resolves on the next health tick; never when probing is disabled.
async fn next_probe(health: &mut Option<tokio::time::Interval>) {
    match health {
        Some(probe) => {
            probe.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expression() {
        let entry = ScheduleEntry::new("weekday", "09:05", &["mon", "Tuesday"]);
        assert_eq!(entry.cron_expression().unwrap(), "0 5 9 * * Mon,Tue *");

        let daily = ScheduleEntry::new("daily", "23:59", &[]);
        assert_eq!(daily.cron_expression().unwrap(), "0 59 23 * * * *");
    }

    #[test]
    fn test_cron_expression_rejects_bad_input() {
        assert!(ScheduleEntry::new("x", "24:00", &[]).cron_expression().is_err());
        assert!(ScheduleEntry::new("x", "9am", &[]).cron_expression().is_err());
        assert!(ScheduleEntry::new("x", "09:00", &["someday"]).cron_expression().is_err());
    }

    #[test]
    fn test_expressions_parse() {
        let entry = ScheduleEntry::new("weekday", "09:05", &["mon", "fri"]);
        assert!(Scheduler::parse_cron(&entry.cron_expression().unwrap()).is_ok());
        assert!(Scheduler::parse_cron("not a cron").is_err());
    }
}

//! Pipeline orchestration: the run algorithm, its retry policy, the weekly
//! scheduler that fires it, and the operator re-queue path.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Moves discovered ideas through development and publishing, one checkpoint at a time.
//! - [`RetryPolicy`] — Bounded retry budget per idea.
//! - [`Scheduler`] — Timetable-driven runs with an IDLE/RUNNING guard against overlap.
//! - [`requeue`] — Returns a FAILED record to the pipeline.
//! - [`HealthStatus`] — Periodic probe of the development and publishing collaborators.

/// The run algorithm.
pub mod engine;
/// Operator re-queue of failed records.
pub mod requeue;
/// Collaborator health probe.
pub mod health;
/// Retry budget.
pub mod retry;
/// Weekly run scheduler.
pub mod scheduler;

pub use engine::{rank_candidates, Orchestrator, OrchestratorConfig};
pub use health::HealthStatus;
pub use requeue::requeue;
pub use retry::RetryPolicy;
pub use scheduler::{ScheduleEntry, Scheduler, SchedulerConfig, TickOutcome};

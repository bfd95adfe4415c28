//! Core types and error definitions for the Ideaforge pipeline.
//!
//! This crate provides the foundational types shared across all Ideaforge crates:
//! the error taxonomy, discovered ideas and their fingerprints, the persisted
//! project ledger entries, scheduler state, and run reports.
//!
//! # Main types
//!
//! - [`IdeaforgeError`] — Unified error enum for all pipeline subsystems.
//! - [`IdeaforgeResult`] — Convenience alias for `Result<T, IdeaforgeError>`.
//! - [`Idea`] — A candidate project produced by a discovery provider.
//! - [`Fingerprint`] — Normalized dedup key derived from an idea's title and source.
//! - [`ProjectRecord`] — The durable state of one idea moving through the pipeline.
//! - [`ScheduleState`] — Persisted IDLE/RUNNING state of the scheduler.
//! - [`RunReport`] — Summary of one orchestrator run.

/// Error taxonomy and structured service failures.
pub mod error;
/// Ideas, categories and fingerprints.
pub mod idea;
/// Project records and the status transition table.
pub mod record;
/// Run reports and per-idea outcomes.
pub mod report;
/// Scheduler state record.
pub mod schedule;

pub use error::{FailureCode, IdeaforgeError, IdeaforgeResult, ServiceFailure};
pub use idea::{Category, Fingerprint, Idea};
pub use record::{ArtifactRef, ProjectRecord, ProjectStatus};
pub use report::{IdeaOutcome, RunReport};
pub use schedule::{ScheduleState, SchedulerPhase};

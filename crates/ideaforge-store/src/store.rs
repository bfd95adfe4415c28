use async_trait::async_trait;
use ideaforge_core::{
    Fingerprint, IdeaforgeError, IdeaforgeResult, ProjectRecord, ProjectStatus, ScheduleState,
};

/// Storage contract for the pipeline ledger.
///
/// Implementations must make `upsert` atomic (the new state is either fully
/// persisted or the prior state is left untouched) and idempotent (writing
/// the same record twice is harmless). Concurrent upserts for one fingerprint
/// are serialized, and a record that is not the direct successor of the
/// stored one is rejected.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Look up the record for a fingerprint.
    async fn get(&self, fingerprint: &Fingerprint) -> IdeaforgeResult<Option<ProjectRecord>>;

    /// Insert or replace the record for `record.fingerprint`.
    async fn upsert(&self, record: &ProjectRecord) -> IdeaforgeResult<()>;

    /// List records, optionally filtered by status, oldest first.
    async fn list(&self, status: Option<ProjectStatus>) -> IdeaforgeResult<Vec<ProjectRecord>>;

    /// Load the scheduler state (default IDLE when never saved).
    async fn load_schedule(&self) -> IdeaforgeResult<ScheduleState>;

    /// Persist the scheduler state.
    async fn save_schedule(&self, state: &ScheduleState) -> IdeaforgeResult<()>;
}

/// Compare-and-swap check shared by the implementations.
///
/// A write must be the direct successor of the stored record
/// (`stored.version + 1`). Re-writing the stored record unchanged is accepted.
pub(crate) fn check_version(
    stored: Option<&ProjectRecord>,
    incoming: &ProjectRecord,
) -> IdeaforgeResult<()> {
    let Some(current) = stored else {
        return Ok(());
    };
    if current == incoming || incoming.version == current.version + 1 {
        return Ok(());
    }
    Err(IdeaforgeError::Persistence(format!(
        "stale write for {}: stored version {}, incoming version {}",
        incoming.fingerprint, current.version, incoming.version
    )))
}
